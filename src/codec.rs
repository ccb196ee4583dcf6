// SMPP v3.4 Codec - wire primitives shared by every PDU body
//
// Decoding works on a cursor over exactly one frame: reads past the end of the
// frame are reported as `CodecError::OffsetOverrun`, never as a panic. Encoding
// mirrors decoding field for field; `Pdu::to_bytes` prefixes the result with the
// computed command_length.

use crate::datatypes::{CommandId, CommandStatus, Tlv};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Maximum allowed PDU size to prevent memory exhaustion attacks
pub const MAX_PDU_SIZE: u32 = 65536; // 64KB

/// SMPP v3.4 PDU Header (16 bytes, common to all PDUs)
#[derive(Debug, Clone, PartialEq)]
pub struct PduHeader {
    pub command_length: u32,
    pub command_id: CommandId,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    /// Decode PDU header from buffer with validation
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let command_length = decode_u32(buf)?;
        let command_id_raw = decode_u32(buf)?;
        let command_id = CommandId::try_from(command_id_raw)
            .map_err(|_| CodecError::InvalidCommandId(command_id_raw))?;
        let command_status_raw = decode_u32(buf)?;
        let command_status = CommandStatus::from_code(command_status_raw)
            .ok_or(CodecError::InvalidCommandStatus(command_status_raw))?;
        let sequence_number = decode_u32(buf)?;

        if command_length < Self::SIZE as u32 || command_length > MAX_PDU_SIZE {
            return Err(CodecError::InvalidPduLength {
                length: command_length,
                min: Self::SIZE as u32,
                max: MAX_PDU_SIZE,
            });
        }

        // SMPP v3.4: requests must have command_status = 0
        if !command_id.is_response() && command_status != CommandStatus::Ok {
            return Err(CodecError::InvalidRequestStatus {
                command_id,
                command_status,
            });
        }

        Ok(PduHeader {
            command_length,
            command_id,
            command_status,
            sequence_number,
        })
    }

    /// Encode PDU header to buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.command_length);
        buf.put_u32(self.command_id as u32);
        buf.put_u32(self.command_status.code());
        buf.put_u32(self.sequence_number);
    }
}

/// A PDU body that can be written after the header.
pub trait Encodable {
    /// Encode the body fields of this PDU (everything after the header)
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError>;

    /// Number of bytes `encode` appends when it succeeds
    fn encoded_size(&self) -> usize;
}

/// A PDU body that can be read once the header is known.
pub trait Decodable: Sized {
    /// Decode the body that follows `header`. The cursor covers the whole
    /// frame and is positioned right after the header.
    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;
}

/// Codec errors with detailed context for debugging
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(
        "Offset exceeds buffer length. Current offset: {offset}. Buffer length: {len}. Desired length: {wanted}."
    )]
    OffsetOverrun {
        offset: usize,
        len: usize,
        wanted: usize,
    },

    #[error("Invalid command_id: {0:#x}")]
    InvalidCommandId(u32),

    #[error("Invalid command_status: {0:#x}")]
    InvalidCommandStatus(u32),

    #[error("Invalid PDU length: {length}, must be {min}-{max}")]
    InvalidPduLength { length: u32, min: u32, max: u32 },

    #[error("command_length {declared} does not match frame of {actual} bytes")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("{trailing} unconsumed bytes after decoding {command_id:?}")]
    TrailingBytes { command_id: CommandId, trailing: usize },

    #[error("Request PDU {command_id:?} has non-zero status: {command_status:?}")]
    InvalidRequestStatus {
        command_id: CommandId,
        command_status: CommandStatus,
    },

    #[error("Null terminator not found within maximum length {max_len} of field '{field}'")]
    MissingNullTerminator { field: &'static str, max_len: usize },

    #[error("TLV value length {length} exceeds remaining buffer length {remaining}")]
    TlvLengthOverrun { length: usize, remaining: usize },

    #[error("Field '{field}' validation failed: {reason}")]
    FieldValidation { field: &'static str, reason: String },
}

/// Convert codec errors to appropriate SMPP command_status codes
impl CodecError {
    pub fn to_command_status(&self) -> CommandStatus {
        match self {
            CodecError::InvalidPduLength { .. } | CodecError::LengthMismatch { .. } => {
                CommandStatus::InvalidCommandLength
            }
            CodecError::InvalidCommandId(_) => CommandStatus::InvalidCommandId,
            CodecError::TlvLengthOverrun { .. } => CommandStatus::InvalidParameterLength,
            CodecError::FieldValidation { field, .. } => match *field {
                "source_addr" => CommandStatus::InvalidSourceAddress,
                "destination_addr" => CommandStatus::InvalidDestinationAddress,
                "short_message" => CommandStatus::InvalidMsgLength,
                _ => CommandStatus::SystemError,
            },
            _ => CommandStatus::SystemError,
        }
    }
}

fn ensure_remaining(buf: &Cursor<&[u8]>, wanted: usize) -> Result<(), CodecError> {
    if buf.remaining() < wanted {
        return Err(CodecError::OffsetOverrun {
            offset: buf.position() as usize,
            len: buf.get_ref().len(),
            wanted,
        });
    }
    Ok(())
}

/// Decode a single byte
pub fn decode_u8(buf: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

/// Decode a 16-bit big-endian integer
pub fn decode_u16(buf: &mut Cursor<&[u8]>) -> Result<u16, CodecError> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_u16())
}

/// Decode a 32-bit big-endian integer
pub fn decode_u32(buf: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_u32())
}

/// Decode `len` raw bytes
pub fn decode_bytes(buf: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, CodecError> {
    ensure_remaining(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Decode a C-Octet String: bytes up to a NUL terminator, which is consumed.
///
/// `max_len` is the longest payload allowed before the terminator. A payload
/// of `max_len` bytes not followed by NUL is an error, as is running off the
/// end of the frame.
///
/// Payloads that are not valid UTF-8 are read as Latin-1, one char per byte.
pub fn decode_cstring(
    buf: &mut Cursor<&[u8]>,
    max_len: usize,
    field_name: &'static str,
) -> Result<String, CodecError> {
    let start = buf.position() as usize;
    let data = &buf.get_ref()[start.min(buf.get_ref().len())..];

    let window = &data[..data.len().min(max_len + 1)];
    let Some(end) = window.iter().position(|&b| b == 0) else {
        if data.len() > max_len {
            return Err(CodecError::MissingNullTerminator {
                field: field_name,
                max_len,
            });
        }
        return Err(CodecError::OffsetOverrun {
            offset: buf.get_ref().len(),
            len: buf.get_ref().len(),
            wanted: 1,
        });
    };

    let value = match std::str::from_utf8(&window[..end]) {
        Ok(text) => text.to_owned(),
        Err(_) => window[..end].iter().map(|&b| char::from(b)).collect(),
    };
    buf.advance(end + 1);
    Ok(value)
}

/// Decode the trailing optional-parameter block: TLVs until the frame ends.
pub fn decode_tlvs(buf: &mut Cursor<&[u8]>) -> Result<Vec<Tlv>, CodecError> {
    let mut tlvs = Vec::new();
    while buf.has_remaining() {
        let tag = decode_u16(buf)?;
        let length = decode_u16(buf)? as usize;
        if buf.remaining() < length {
            return Err(CodecError::TlvLengthOverrun {
                length,
                remaining: buf.remaining(),
            });
        }
        tlvs.push(Tlv::new(tag, buf.copy_to_bytes(length)));
    }
    Ok(tlvs)
}

/// Encode a C-Octet String followed by its NUL terminator.
///
/// Unlike the fixed-width layout of some SMPP stacks, nothing is padded: the
/// field occupies `value.len() + 1` bytes.
pub fn encode_cstring(
    buf: &mut BytesMut,
    value: &str,
    max_len: usize,
    field_name: &'static str,
) -> Result<(), CodecError> {
    let bytes = value.as_bytes();
    if bytes.len() > max_len {
        return Err(CodecError::FieldValidation {
            field: field_name,
            reason: format!("{} bytes exceeds maximum of {max_len}", bytes.len()),
        });
    }
    if bytes.contains(&0) {
        return Err(CodecError::FieldValidation {
            field: field_name,
            reason: "embedded NUL byte".to_string(),
        });
    }
    buf.put_slice(bytes);
    buf.put_u8(0);
    Ok(())
}

/// Encode a single byte
pub fn encode_u8(buf: &mut BytesMut, value: u8) {
    buf.put_u8(value);
}

/// Encode a 16-bit big-endian integer
pub fn encode_u16(buf: &mut BytesMut, value: u16) {
    buf.put_u16(value);
}

/// Encode a 32-bit big-endian integer
pub fn encode_u32(buf: &mut BytesMut, value: u32) {
    buf.put_u32(value);
}

/// Encode TLVs in their original order
pub fn encode_tlvs(buf: &mut BytesMut, tlvs: &[Tlv]) -> Result<(), CodecError> {
    for tlv in tlvs {
        tlv.encode(buf)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdu_header_encode_decode() {
        let header = PduHeader {
            command_length: 16,
            command_id: CommandId::EnquireLink,
            command_status: CommandStatus::Ok,
            sequence_number: 42,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        let mut cursor = Cursor::new(buf.as_ref());
        let decoded = PduHeader::decode(&mut cursor).unwrap();

        assert_eq!(header, decoded);
    }

    #[test]
    fn pdu_header_validation() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x08, // command_length too small
            0x00, 0x00, 0x00, 0x15, // command_id
            0x00, 0x00, 0x00, 0x00, // command_status
            0x00, 0x00, 0x00, 0x01, // sequence_number
        ];
        let mut cursor = Cursor::new(data);
        let result = PduHeader::decode(&mut cursor);
        assert!(matches!(result, Err(CodecError::InvalidPduLength { .. })));

        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x10, // command_length
            0x00, 0x00, 0x00, 0x15, // enquire_link
            0x00, 0x00, 0x00, 0x08, // non-zero status on a request
            0x00, 0x00, 0x00, 0x01, // sequence_number
        ];
        let mut cursor = Cursor::new(data);
        let result = PduHeader::decode(&mut cursor);
        assert!(matches!(result, Err(CodecError::InvalidRequestStatus { .. })));
    }

    #[test]
    fn header_reports_raw_unknown_status() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x10, //
            0x80, 0x00, 0x00, 0x15, //
            0x00, 0x00, 0x00, 0x09, // reserved
            0x00, 0x00, 0x00, 0x01, //
        ];
        let mut cursor = Cursor::new(data);
        let result = PduHeader::decode(&mut cursor);
        assert!(matches!(result, Err(CodecError::InvalidCommandStatus(0x9))));
    }

    #[test]
    fn header_keeps_vendor_status() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x10, //
            0x80, 0x00, 0x00, 0x04, //
            0x00, 0x00, 0x04, 0x01, // vendor specific status
            0x00, 0x00, 0x00, 0x07, //
        ];
        let mut cursor = Cursor::new(data);
        let header = PduHeader::decode(&mut cursor).unwrap();
        assert_eq!(header.command_status, CommandStatus::Vendor(0x401));

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.as_ref(), data);
    }

    #[test]
    fn decode_past_end_is_an_error() {
        let data = [0x01u8, 0x02, 0x03];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(decode_u16(&mut cursor).unwrap(), 0x0102);
        let err = decode_u32(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            CodecError::OffsetOverrun {
                offset: 2,
                len: 3,
                wanted: 4
            }
        ));
        assert!(err.to_string().starts_with("Offset exceeds buffer length"));
    }

    #[test]
    fn decode_cstring_stops_at_terminator() {
        let data = b"hello\0world\0";
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(decode_cstring(&mut cursor, 16, "a").unwrap(), "hello");
        assert_eq!(cursor.position(), 6);
        assert_eq!(decode_cstring(&mut cursor, 16, "b").unwrap(), "world");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn decode_cstring_accepts_exactly_max_len() {
        let data = b"abcd\0";
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(decode_cstring(&mut cursor, 4, "f").unwrap(), "abcd");
    }

    #[test]
    fn decode_cstring_without_terminator_within_max() {
        let data = b"abcdef\0";
        let mut cursor = Cursor::new(&data[..]);
        let result = decode_cstring(&mut cursor, 4, "system_id");
        assert!(matches!(
            result,
            Err(CodecError::MissingNullTerminator {
                field: "system_id",
                max_len: 4
            })
        ));
    }

    #[test]
    fn decode_cstring_reads_latin1_bytes() {
        let data = b"caf\xe9\0";
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(decode_cstring(&mut cursor, 20, "source_addr").unwrap(), "caf\u{e9}");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn decode_cstring_running_off_the_frame() {
        let data = b"abc";
        let mut cursor = Cursor::new(&data[..]);
        let result = decode_cstring(&mut cursor, 16, "f");
        assert!(matches!(result, Err(CodecError::OffsetOverrun { .. })));
    }

    #[test]
    fn encode_cstring_is_not_padded() {
        let mut buf = BytesMut::new();
        encode_cstring(&mut buf, "hello", 10, "f").unwrap();
        assert_eq!(buf.as_ref(), b"hello\0");
    }

    #[test]
    fn encode_cstring_rejects_overlong_values() {
        let mut buf = BytesMut::new();
        let result = encode_cstring(&mut buf, "toolong", 4, "password");
        assert!(matches!(
            result,
            Err(CodecError::FieldValidation {
                field: "password",
                ..
            })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn tlvs_decode_until_frame_end() {
        let data: &[u8] = &[
            0x02, 0x04, 0x00, 0x02, 0xAB, 0xCD, // user_message_reference
            0x04, 0x24, 0x00, 0x00, // empty message_payload
        ];
        let mut cursor = Cursor::new(data);
        let tlvs = decode_tlvs(&mut cursor).unwrap();
        assert_eq!(tlvs.len(), 2);
        assert_eq!(tlvs[0].tag, 0x0204);
        assert_eq!(tlvs[0].value.as_ref(), &[0xAB, 0xCD]);
        assert!(tlvs[1].value.is_empty());
    }

    #[test]
    fn tlv_length_overrun() {
        let data: &[u8] = &[0x02, 0x04, 0x00, 0x05, 0xAB];
        let mut cursor = Cursor::new(data);
        let result = decode_tlvs(&mut cursor);
        assert!(matches!(
            result,
            Err(CodecError::TlvLengthOverrun {
                length: 5,
                remaining: 1
            })
        ));
    }

    #[test]
    fn codec_errors_map_to_status() {
        assert_eq!(
            CodecError::InvalidCommandId(0x42).to_command_status(),
            CommandStatus::InvalidCommandId
        );
        assert_eq!(
            CodecError::LengthMismatch {
                declared: 20,
                actual: 16
            }
            .to_command_status(),
            CommandStatus::InvalidCommandLength
        );
    }
}
