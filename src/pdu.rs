//! SMPP v3.4 PDU sum type
//!
//! Every supported PDU kind is one variant of [`Pdu`]. Decoding peeks the
//! command_id at byte offset 4 of the frame, picks the variant and applies
//! its body layout; an unknown command_id is a decode error, never a
//! fallback variant.

use crate::codec::{CodecError, Decodable, Encodable, PduHeader};
use crate::datatypes::{
    BindMode, BindRequest, BindResponse, CommandId, CommandStatus, EnquireLink, EnquireLinkResponse,
    GenericNack, MessageRequest, MessageResponse, Unbind, UnbindResponse,
};
use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pdu {
    BindTransmitter(BindRequest),
    BindTransmitterResp(BindResponse),
    BindReceiver(BindRequest),
    BindReceiverResp(BindResponse),
    BindTransceiver(BindRequest),
    BindTransceiverResp(BindResponse),
    SubmitSm(Box<MessageRequest>),
    SubmitSmResp(MessageResponse),
    DeliverSm(Box<MessageRequest>),
    DeliverSmResp(MessageResponse),
    Unbind(Unbind),
    UnbindResp(UnbindResponse),
    EnquireLink(EnquireLink),
    EnquireLinkResp(EnquireLinkResponse),
    GenericNack(GenericNack),
}

// Applies the same expression to the body of whichever variant is present.
macro_rules! with_body {
    ($pdu:expr, $body:ident => $e:expr) => {
        match $pdu {
            Pdu::BindTransmitter($body)
            | Pdu::BindReceiver($body)
            | Pdu::BindTransceiver($body) => $e,
            Pdu::BindTransmitterResp($body)
            | Pdu::BindReceiverResp($body)
            | Pdu::BindTransceiverResp($body) => $e,
            Pdu::SubmitSm($body) | Pdu::DeliverSm($body) => $e,
            Pdu::SubmitSmResp($body) | Pdu::DeliverSmResp($body) => $e,
            Pdu::Unbind($body) => $e,
            Pdu::UnbindResp($body) => $e,
            Pdu::EnquireLink($body) => $e,
            Pdu::EnquireLinkResp($body) => $e,
            Pdu::GenericNack($body) => $e,
        }
    };
}

impl Pdu {
    pub fn command_id(&self) -> CommandId {
        match self {
            Pdu::BindTransmitter(_) => CommandId::BindTransmitter,
            Pdu::BindTransmitterResp(_) => CommandId::BindTransmitterResp,
            Pdu::BindReceiver(_) => CommandId::BindReceiver,
            Pdu::BindReceiverResp(_) => CommandId::BindReceiverResp,
            Pdu::BindTransceiver(_) => CommandId::BindTransceiver,
            Pdu::BindTransceiverResp(_) => CommandId::BindTransceiverResp,
            Pdu::SubmitSm(_) => CommandId::SubmitSm,
            Pdu::SubmitSmResp(_) => CommandId::SubmitSmResp,
            Pdu::DeliverSm(_) => CommandId::DeliverSm,
            Pdu::DeliverSmResp(_) => CommandId::DeliverSmResp,
            Pdu::Unbind(_) => CommandId::Unbind,
            Pdu::UnbindResp(_) => CommandId::UnbindResp,
            Pdu::EnquireLink(_) => CommandId::EnquireLink,
            Pdu::EnquireLinkResp(_) => CommandId::EnquireLinkResp,
            Pdu::GenericNack(_) => CommandId::GenericNack,
        }
    }

    pub fn command_status(&self) -> CommandStatus {
        with_body!(self, body => body.command_status)
    }

    pub fn sequence_number(&self) -> u32 {
        with_body!(self, body => body.sequence_number)
    }

    /// Returns the same PDU carrying `sequence_number`
    pub fn with_sequence_number(mut self, sequence_number: u32) -> Self {
        with_body!(&mut self, body => body.sequence_number = sequence_number);
        self
    }

    pub fn is_response(&self) -> bool {
        self.command_id().is_response()
    }

    pub fn is_request(&self) -> bool {
        !self.is_response()
    }

    /// Wrap a message request body in the variant matching `command_id`
    /// (submit_sm or deliver_sm).
    pub fn message_request(command_id: CommandId, body: MessageRequest) -> Option<Self> {
        match command_id {
            CommandId::SubmitSm => Some(Pdu::SubmitSm(Box::new(body))),
            CommandId::DeliverSm => Some(Pdu::DeliverSm(Box::new(body))),
            _ => None,
        }
    }

    /// Wrap a message response body in the variant matching `command_id`
    /// (submit_sm_resp or deliver_sm_resp).
    pub fn message_response(command_id: CommandId, body: MessageResponse) -> Option<Self> {
        match command_id {
            CommandId::SubmitSmResp => Some(Pdu::SubmitSmResp(body)),
            CommandId::DeliverSmResp => Some(Pdu::DeliverSmResp(body)),
            _ => None,
        }
    }

    pub fn bind_request(mode: BindMode, body: BindRequest) -> Self {
        match mode {
            BindMode::Transmitter => Pdu::BindTransmitter(body),
            BindMode::Receiver => Pdu::BindReceiver(body),
            BindMode::Transceiver => Pdu::BindTransceiver(body),
        }
    }

    pub fn bind_response(mode: BindMode, body: BindResponse) -> Self {
        match mode {
            BindMode::Transmitter => Pdu::BindTransmitterResp(body),
            BindMode::Receiver => Pdu::BindReceiverResp(body),
            BindMode::Transceiver => Pdu::BindTransceiverResp(body),
        }
    }

    /// Length of the encoded frame, header included.
    pub fn encoded_len(&self) -> usize {
        PduHeader::SIZE + with_body!(self, body => body.encoded_size())
    }

    /// Encode the full frame, header included.
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the full frame to `buf`. On error `buf` is left as it was.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();

        // Write a placeholder length that is patched once the body is known
        let header = PduHeader {
            command_length: 0,
            command_id: self.command_id(),
            command_status: self.command_status(),
            sequence_number: self.sequence_number(),
        };
        header.encode(buf);

        let body = with_body!(self, body => body.encode(buf));
        if let Err(e) = body {
            buf.truncate(start);
            return Err(e);
        }

        let length = (buf.len() - start) as u32;
        buf[start..start + 4].copy_from_slice(&length.to_be_bytes());
        Ok(())
    }

    /// Decode exactly one frame. The frame must be `command_length` bytes long
    /// and every byte must be consumed by the variant's layout.
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() >= 8 {
            let raw = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
            if CommandId::try_from(raw).is_err() {
                return Err(CodecError::InvalidCommandId(raw));
            }
        }

        let mut buf = Cursor::new(frame);
        let header = PduHeader::decode(&mut buf)?;
        if header.command_length as usize != frame.len() {
            return Err(CodecError::LengthMismatch {
                declared: header.command_length,
                actual: frame.len(),
            });
        }

        let pdu = match header.command_id {
            CommandId::BindTransmitter => Pdu::BindTransmitter(decode_body(&header, &mut buf)?),
            CommandId::BindTransmitterResp => {
                Pdu::BindTransmitterResp(decode_body(&header, &mut buf)?)
            }
            CommandId::BindReceiver => Pdu::BindReceiver(decode_body(&header, &mut buf)?),
            CommandId::BindReceiverResp => Pdu::BindReceiverResp(decode_body(&header, &mut buf)?),
            CommandId::BindTransceiver => Pdu::BindTransceiver(decode_body(&header, &mut buf)?),
            CommandId::BindTransceiverResp => {
                Pdu::BindTransceiverResp(decode_body(&header, &mut buf)?)
            }
            CommandId::SubmitSm => Pdu::SubmitSm(Box::new(decode_body(&header, &mut buf)?)),
            CommandId::SubmitSmResp => Pdu::SubmitSmResp(decode_body(&header, &mut buf)?),
            CommandId::DeliverSm => Pdu::DeliverSm(Box::new(decode_body(&header, &mut buf)?)),
            CommandId::DeliverSmResp => Pdu::DeliverSmResp(decode_body(&header, &mut buf)?),
            CommandId::Unbind => Pdu::Unbind(decode_body(&header, &mut buf)?),
            CommandId::UnbindResp => Pdu::UnbindResp(decode_body(&header, &mut buf)?),
            CommandId::EnquireLink => Pdu::EnquireLink(decode_body(&header, &mut buf)?),
            CommandId::EnquireLinkResp => Pdu::EnquireLinkResp(decode_body(&header, &mut buf)?),
            CommandId::GenericNack => Pdu::GenericNack(decode_body(&header, &mut buf)?),
        };

        if buf.has_remaining() {
            return Err(CodecError::TrailingBytes {
                command_id: header.command_id,
                trailing: buf.remaining(),
            });
        }

        Ok(pdu)
    }
}

fn decode_body<T: Decodable>(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<T, CodecError> {
    T::decode(header, buf)
}
