// ABOUTME: Message PDU bodies shared by submit_sm/deliver_sm and their responses
// ABOUTME: The direction is carried by the wrapping Pdu variant, not by these structs

use crate::codec::{
    decode_bytes, decode_cstring, decode_tlvs, decode_u8, encode_cstring, encode_tlvs, encode_u8,
    CodecError, Decodable, Encodable, PduHeader,
};
use crate::datatypes::tlv::Tlv;
use crate::datatypes::{CommandStatus, NumericPlanIndicator, TypeOfNumber};
use crate::macros::{builder_setters, string_setters};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

// Field length limits, excluding the null terminator
pub const MAX_SERVICE_TYPE_LENGTH: usize = 6;
pub const MAX_ADDRESS_LENGTH: usize = 21;
pub const MAX_TIME_LENGTH: usize = 17;
pub const MAX_MESSAGE_ID_LENGTH: usize = 65;
pub const MAX_SHORT_MESSAGE_LENGTH: usize = 255;

/// submit_sm (ESME to SMSC) and deliver_sm (SMSC to ESME) body.
///
/// `sm_length` is not stored: it is always the length of `short_message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRequest {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    pub service_type: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub destination_addr: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: Bytes,
    pub tlvs: Vec<Tlv>,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageValidationError {
    #[error("{field} exceeds maximum length of {max} characters: {actual}")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("short_message exceeds {MAX_SHORT_MESSAGE_LENGTH} octets: {actual}; use the message_payload TLV instead")]
    ShortMessageTooLong { actual: usize },
}

impl MessageRequest {
    pub fn builder() -> MessageRequestBuilder {
        MessageRequestBuilder::new()
    }

    pub fn validate(&self) -> Result<(), MessageValidationError> {
        let fields = [
            ("service_type", &self.service_type, MAX_SERVICE_TYPE_LENGTH),
            ("source_addr", &self.source_addr, MAX_ADDRESS_LENGTH),
            ("destination_addr", &self.destination_addr, MAX_ADDRESS_LENGTH),
            (
                "schedule_delivery_time",
                &self.schedule_delivery_time,
                MAX_TIME_LENGTH,
            ),
            ("validity_period", &self.validity_period, MAX_TIME_LENGTH),
        ];
        for (field, value, max) in fields {
            if value.len() > max {
                return Err(MessageValidationError::FieldTooLong {
                    field,
                    max,
                    actual: value.len(),
                });
            }
        }

        if self.short_message.len() > MAX_SHORT_MESSAGE_LENGTH {
            return Err(MessageValidationError::ShortMessageTooLong {
                actual: self.short_message.len(),
            });
        }

        Ok(())
    }
}

impl Encodable for MessageRequest {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let sm_length =
            u8::try_from(self.short_message.len()).map_err(|_| CodecError::FieldValidation {
                field: "short_message",
                reason: format!(
                    "{} octets exceeds maximum of {MAX_SHORT_MESSAGE_LENGTH}",
                    self.short_message.len()
                ),
            })?;

        encode_cstring(buf, &self.service_type, MAX_SERVICE_TYPE_LENGTH, "service_type")?;
        encode_u8(buf, self.source_addr_ton);
        encode_u8(buf, self.source_addr_npi);
        encode_cstring(buf, &self.source_addr, MAX_ADDRESS_LENGTH, "source_addr")?;
        encode_u8(buf, self.dest_addr_ton);
        encode_u8(buf, self.dest_addr_npi);
        encode_cstring(
            buf,
            &self.destination_addr,
            MAX_ADDRESS_LENGTH,
            "destination_addr",
        )?;
        encode_u8(buf, self.esm_class);
        encode_u8(buf, self.protocol_id);
        encode_u8(buf, self.priority_flag);
        encode_cstring(
            buf,
            &self.schedule_delivery_time,
            MAX_TIME_LENGTH,
            "schedule_delivery_time",
        )?;
        encode_cstring(buf, &self.validity_period, MAX_TIME_LENGTH, "validity_period")?;
        encode_u8(buf, self.registered_delivery);
        encode_u8(buf, self.replace_if_present_flag);
        encode_u8(buf, self.data_coding);
        encode_u8(buf, self.sm_default_msg_id);
        encode_u8(buf, sm_length);
        buf.put_slice(&self.short_message);
        encode_tlvs(buf, &self.tlvs)
    }

    fn encoded_size(&self) -> usize {
        self.service_type.len()
            + self.source_addr.len()
            + self.destination_addr.len()
            + self.schedule_delivery_time.len()
            + self.validity_period.len()
            + 17
            + self.short_message.len()
            + self.tlvs.iter().map(Tlv::encoded_size).sum::<usize>()
    }
}

impl Decodable for MessageRequest {
    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let service_type = decode_cstring(buf, MAX_SERVICE_TYPE_LENGTH, "service_type")?;
        let source_addr_ton = decode_u8(buf)?;
        let source_addr_npi = decode_u8(buf)?;
        let source_addr = decode_cstring(buf, MAX_ADDRESS_LENGTH, "source_addr")?;
        let dest_addr_ton = decode_u8(buf)?;
        let dest_addr_npi = decode_u8(buf)?;
        let destination_addr = decode_cstring(buf, MAX_ADDRESS_LENGTH, "destination_addr")?;
        let esm_class = decode_u8(buf)?;
        let protocol_id = decode_u8(buf)?;
        let priority_flag = decode_u8(buf)?;
        let schedule_delivery_time =
            decode_cstring(buf, MAX_TIME_LENGTH, "schedule_delivery_time")?;
        let validity_period = decode_cstring(buf, MAX_TIME_LENGTH, "validity_period")?;
        let registered_delivery = decode_u8(buf)?;
        let replace_if_present_flag = decode_u8(buf)?;
        let data_coding = decode_u8(buf)?;
        let sm_default_msg_id = decode_u8(buf)?;
        let sm_length = decode_u8(buf)? as usize;
        let short_message = decode_bytes(buf, sm_length)?;
        let tlvs = decode_tlvs(buf)?;

        Ok(MessageRequest {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            short_message,
            tlvs,
        })
    }
}

/// Builder for message requests. Every field defaults to zero or empty.
#[derive(Default)]
pub struct MessageRequestBuilder {
    sequence_number: u32,
    service_type: String,
    source_addr_ton: u8,
    source_addr_npi: u8,
    source_addr: String,
    dest_addr_ton: u8,
    dest_addr_npi: u8,
    destination_addr: String,
    esm_class: u8,
    protocol_id: u8,
    priority_flag: u8,
    schedule_delivery_time: String,
    validity_period: String,
    registered_delivery: u8,
    replace_if_present_flag: u8,
    data_coding: u8,
    sm_default_msg_id: u8,
    short_message: Bytes,
    tlvs: Vec<Tlv>,
}

impl MessageRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    builder_setters! {
        sequence_number: u32,
        esm_class: u8,
        protocol_id: u8,
        priority_flag: u8,
        registered_delivery: u8,
        replace_if_present_flag: u8,
        data_coding: u8,
        sm_default_msg_id: u8,
    }

    string_setters!(
        service_type,
        source_addr,
        destination_addr,
        schedule_delivery_time,
        validity_period,
    );

    pub fn source_numbering(mut self, ton: TypeOfNumber, npi: NumericPlanIndicator) -> Self {
        self.source_addr_ton = ton.into();
        self.source_addr_npi = npi.into();
        self
    }

    pub fn dest_numbering(mut self, ton: TypeOfNumber, npi: NumericPlanIndicator) -> Self {
        self.dest_addr_ton = ton.into();
        self.dest_addr_npi = npi.into();
        self
    }

    pub fn short_message(mut self, message: impl Into<Bytes>) -> Self {
        self.short_message = message.into();
        self
    }

    pub fn tlv(mut self, tlv: Tlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    pub fn build(self) -> Result<MessageRequest, MessageValidationError> {
        let request = MessageRequest {
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
            service_type: self.service_type,
            source_addr_ton: self.source_addr_ton,
            source_addr_npi: self.source_addr_npi,
            source_addr: self.source_addr,
            dest_addr_ton: self.dest_addr_ton,
            dest_addr_npi: self.dest_addr_npi,
            destination_addr: self.destination_addr,
            esm_class: self.esm_class,
            protocol_id: self.protocol_id,
            priority_flag: self.priority_flag,
            schedule_delivery_time: self.schedule_delivery_time,
            validity_period: self.validity_period,
            registered_delivery: self.registered_delivery,
            replace_if_present_flag: self.replace_if_present_flag,
            data_coding: self.data_coding,
            sm_default_msg_id: self.sm_default_msg_id,
            short_message: self.short_message,
            tlvs: self.tlvs,
        };
        request.validate()?;
        Ok(request)
    }
}

/// submit_sm_resp / deliver_sm_resp body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    /// SMSC assigned message id; always empty in deliver_sm_resp.
    pub message_id: String,
    pub tlvs: Vec<Tlv>,
}

impl MessageResponse {
    pub fn new(sequence_number: u32, message_id: impl Into<String>) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id: message_id.into(),
            tlvs: Vec::new(),
        }
    }

    pub fn error(sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            command_status: status,
            sequence_number,
            message_id: String::new(),
            tlvs: Vec::new(),
        }
    }
}

impl Encodable for MessageResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_cstring(buf, &self.message_id, MAX_MESSAGE_ID_LENGTH, "message_id")?;
        encode_tlvs(buf, &self.tlvs)
    }

    fn encoded_size(&self) -> usize {
        self.message_id.len() + 1 + self.tlvs.iter().map(Tlv::encoded_size).sum::<usize>()
    }
}

impl Decodable for MessageResponse {
    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        // Some SMSCs send error responses with no body at all
        let message_id = if buf.has_remaining() {
            decode_cstring(buf, MAX_MESSAGE_ID_LENGTH, "message_id")?
        } else {
            String::new()
        };

        Ok(MessageResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
            tlvs: decode_tlvs(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::CommandId;

    fn header(command_id: CommandId) -> PduHeader {
        PduHeader {
            command_length: 0,
            command_id,
            command_status: CommandStatus::Ok,
            sequence_number: 5,
        }
    }

    #[test]
    fn sm_length_follows_short_message() {
        let request = MessageRequest::builder()
            .destination_addr("+12015551234")
            .short_message("Hello")
            .build()
            .unwrap();

        let mut buf = BytesMut::new();
        request.encode(&mut buf).unwrap();

        // service_type(1) ton(1) npi(1) source(1) ton(1) npi(1) dest(13)
        // esm/proto/priority(3) schedule(1) validity(1) 4 flags, then sm_length
        let sm_length_offset = 1 + 1 + 1 + 1 + 1 + 1 + 13 + 3 + 1 + 1 + 4;
        assert_eq!(buf[sm_length_offset], 5);
        assert_eq!(&buf[sm_length_offset + 1..], b"Hello");
    }

    #[test]
    fn builder_rejects_long_short_message() {
        let result = MessageRequest::builder()
            .short_message(vec![b'x'; 256])
            .build();
        assert!(matches!(
            result,
            Err(MessageValidationError::ShortMessageTooLong { actual: 256 })
        ));
    }

    #[test]
    fn builder_rejects_long_destination() {
        let result = MessageRequest::builder()
            .destination_addr("1".repeat(MAX_ADDRESS_LENGTH + 1))
            .build();
        assert!(matches!(
            result,
            Err(MessageValidationError::FieldTooLong {
                field: "destination_addr",
                ..
            })
        ));
    }

    #[test]
    fn short_message_overrunning_frame() {
        let mut body = BytesMut::new();
        MessageRequest::builder()
            .short_message("Hello")
            .build()
            .unwrap()
            .encode(&mut body)
            .unwrap();
        let truncated = &body[..body.len() - 2];

        let mut cursor = Cursor::new(truncated);
        let result = MessageRequest::decode(&header(CommandId::SubmitSm), &mut cursor);
        assert!(matches!(result, Err(CodecError::OffsetOverrun { .. })));
    }

    #[test]
    fn empty_response_body_decodes() {
        let empty: &[u8] = &[];
        let mut cursor = Cursor::new(empty);
        let response =
            MessageResponse::decode(&header(CommandId::DeliverSmResp), &mut cursor).unwrap();
        assert_eq!(response.message_id, "");
        assert!(response.tlvs.is_empty());
    }
}
