use crate::codec::{
    decode_cstring, decode_tlvs, decode_u8, encode_cstring, encode_tlvs, encode_u8, CodecError,
    Decodable, Encodable, PduHeader,
};
use crate::datatypes::tlv::Tlv;
use crate::datatypes::{
    CommandId, CommandStatus, InterfaceVersion, NumericPlanIndicator, TypeOfNumber, MAX_SYSTEM_ID_LENGTH,
};
use crate::macros::{builder_setters, string_setters};
use bytes::{Buf, BytesMut};
use std::io::Cursor;

// Field length limits, excluding the null terminator
pub const MAX_PASSWORD_LENGTH: usize = 9;
pub const MAX_SYSTEM_TYPE_LENGTH: usize = 13;
pub const MAX_ADDRESS_RANGE_LENGTH: usize = 41;

/// Which of the three bind operations a request or response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindMode {
    Transmitter,
    Receiver,
    Transceiver,
}

impl BindMode {
    pub fn response_id(self) -> CommandId {
        match self {
            BindMode::Transmitter => CommandId::BindTransmitterResp,
            BindMode::Receiver => CommandId::BindReceiverResp,
            BindMode::Transceiver => CommandId::BindTransceiverResp,
        }
    }
}

/// Body shared by bind_transmitter, bind_receiver and bind_transceiver. The
/// bind mode is carried by the `Pdu` variant wrapping it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindRequest {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    // Body
    /// 5.2.1 system_id: identifies the ESME requesting to bind with the SMSC.
    pub system_id: String,

    /// 5.2.2 password: used by the SMSC to authenticate the ESME. Empty when
    ///       no password is required.
    pub password: String,

    /// 5.2.3 system_type: categorizes the type of ESME, e.g. "VMS" or "OTA".
    pub system_type: String,

    /// 5.2.4 interface_version: SMPP version supported by the ESME.
    pub interface_version: u8,

    /// 5.2.5 addr_ton: Type of Number of the ESME address(es) served.
    pub addr_ton: u8,

    /// 5.2.6 addr_npi: Numbering Plan Indicator of the ESME address(es) served.
    pub addr_npi: u8,

    /// 5.2.7 address_range: range of SME addresses serviced by the ESME.
    pub address_range: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BindValidationError {
    #[error("system_id exceeds maximum length of {MAX_SYSTEM_ID_LENGTH} characters: {actual}")]
    SystemIdTooLong { actual: usize },

    #[error("password exceeds maximum length of {MAX_PASSWORD_LENGTH} characters: {actual}")]
    PasswordTooLong { actual: usize },

    #[error("system_type exceeds maximum length of {MAX_SYSTEM_TYPE_LENGTH} characters: {actual}")]
    SystemTypeTooLong { actual: usize },

    #[error("address_range exceeds maximum length of {MAX_ADDRESS_RANGE_LENGTH} characters: {actual}")]
    AddressRangeTooLong { actual: usize },
}

impl BindRequest {
    /// Validates field lengths so the request can be encoded
    pub fn validate(&self) -> Result<(), BindValidationError> {
        if self.system_id.len() > MAX_SYSTEM_ID_LENGTH {
            return Err(BindValidationError::SystemIdTooLong {
                actual: self.system_id.len(),
            });
        }

        if self.password.len() > MAX_PASSWORD_LENGTH {
            return Err(BindValidationError::PasswordTooLong {
                actual: self.password.len(),
            });
        }

        if self.system_type.len() > MAX_SYSTEM_TYPE_LENGTH {
            return Err(BindValidationError::SystemTypeTooLong {
                actual: self.system_type.len(),
            });
        }

        if self.address_range.len() > MAX_ADDRESS_RANGE_LENGTH {
            return Err(BindValidationError::AddressRangeTooLong {
                actual: self.address_range.len(),
            });
        }

        Ok(())
    }

    /// Creates a builder for constructing bind requests with validation
    pub fn builder() -> BindRequestBuilder {
        BindRequestBuilder::new()
    }
}

impl Encodable for BindRequest {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_cstring(buf, &self.system_id, MAX_SYSTEM_ID_LENGTH, "system_id")?;
        encode_cstring(buf, &self.password, MAX_PASSWORD_LENGTH, "password")?;
        encode_cstring(buf, &self.system_type, MAX_SYSTEM_TYPE_LENGTH, "system_type")?;
        encode_u8(buf, self.interface_version);
        encode_u8(buf, self.addr_ton);
        encode_u8(buf, self.addr_npi);
        encode_cstring(
            buf,
            &self.address_range,
            MAX_ADDRESS_RANGE_LENGTH,
            "address_range",
        )?;
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        self.system_id.len()
            + self.password.len()
            + self.system_type.len()
            + self.address_range.len()
            + 7
    }
}

impl Decodable for BindRequest {
    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(BindRequest {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            system_id: decode_cstring(buf, MAX_SYSTEM_ID_LENGTH, "system_id")?,
            password: decode_cstring(buf, MAX_PASSWORD_LENGTH, "password")?,
            system_type: decode_cstring(buf, MAX_SYSTEM_TYPE_LENGTH, "system_type")?,
            interface_version: decode_u8(buf)?,
            addr_ton: decode_u8(buf)?,
            addr_npi: decode_u8(buf)?,
            address_range: decode_cstring(buf, MAX_ADDRESS_RANGE_LENGTH, "address_range")?,
        })
    }
}

/// Builder for creating bind requests with validation and sensible defaults
pub struct BindRequestBuilder {
    sequence_number: u32,
    system_id: String,
    password: String,
    system_type: String,
    interface_version: u8,
    addr_ton: u8,
    addr_npi: u8,
    address_range: String,
}

impl Default for BindRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BindRequestBuilder {
    pub fn new() -> Self {
        Self {
            sequence_number: 0,
            system_id: String::new(),
            password: String::new(),
            system_type: String::new(),
            interface_version: InterfaceVersion::SmppV34.into(),
            addr_ton: TypeOfNumber::Unknown.into(),
            addr_npi: NumericPlanIndicator::Unknown.into(),
            address_range: String::new(),
        }
    }

    builder_setters! {
        sequence_number: u32,
    }

    string_setters!(system_id, password, system_type, address_range);

    pub fn interface_version(mut self, version: InterfaceVersion) -> Self {
        self.interface_version = version.into();
        self
    }

    pub fn addr_ton(mut self, ton: TypeOfNumber) -> Self {
        self.addr_ton = ton.into();
        self
    }

    pub fn addr_npi(mut self, npi: NumericPlanIndicator) -> Self {
        self.addr_npi = npi.into();
        self
    }

    /// Build the bind request, performing validation
    pub fn build(self) -> Result<BindRequest, BindValidationError> {
        let request = BindRequest {
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
            system_id: self.system_id,
            password: self.password,
            system_type: self.system_type,
            interface_version: self.interface_version,
            addr_ton: self.addr_ton,
            addr_npi: self.addr_npi,
            address_range: self.address_range,
        };

        request.validate()?;
        Ok(request)
    }
}

/// Body shared by the three bind response kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    /// SMSC identifier. Error responses may omit the body entirely, which
    /// decodes as an empty string.
    pub system_id: String,

    /// Optional parameters, usually just sc_interface_version
    pub tlvs: Vec<Tlv>,
}

impl BindResponse {
    pub fn new(sequence_number: u32, system_id: impl Into<String>) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            system_id: system_id.into(),
            tlvs: Vec::new(),
        }
    }

    pub fn error(sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            command_status: status,
            sequence_number,
            system_id: String::new(),
            tlvs: Vec::new(),
        }
    }

    pub fn with_tlv(mut self, tlv: Tlv) -> Self {
        self.tlvs.push(tlv);
        self
    }
}

impl Encodable for BindResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_cstring(buf, &self.system_id, MAX_SYSTEM_ID_LENGTH, "system_id")?;
        encode_tlvs(buf, &self.tlvs)
    }

    fn encoded_size(&self) -> usize {
        self.system_id.len() + 1 + self.tlvs.iter().map(Tlv::encoded_size).sum::<usize>()
    }
}

impl Decodable for BindResponse {
    fn decode(header: &PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let system_id = if buf.has_remaining() {
            decode_cstring(buf, MAX_SYSTEM_ID_LENGTH, "system_id")?
        } else {
            String::new()
        };

        Ok(BindResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            system_id,
            tlvs: decode_tlvs(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let bind = BindRequest::builder()
            .system_id("foo")
            .password("bar")
            .build()
            .unwrap();

        assert_eq!(bind.system_id, "foo");
        assert_eq!(bind.password, "bar");
        assert_eq!(bind.interface_version, 0x34);
        assert_eq!(bind.addr_ton, 0);
        assert_eq!(bind.command_status, CommandStatus::Ok);
    }

    #[test]
    fn builder_rejects_long_password() {
        let result = BindRequest::builder()
            .system_id("foo")
            .password("0123456789")
            .build();
        assert!(matches!(
            result,
            Err(BindValidationError::PasswordTooLong { actual: 10 })
        ));
    }

    #[test]
    fn builder_allows_max_lengths() {
        let bind = BindRequest::builder()
            .system_id("a".repeat(MAX_SYSTEM_ID_LENGTH))
            .password("b".repeat(MAX_PASSWORD_LENGTH))
            .system_type("c".repeat(MAX_SYSTEM_TYPE_LENGTH))
            .address_range("d".repeat(MAX_ADDRESS_RANGE_LENGTH))
            .build();
        assert!(bind.is_ok());
    }

    #[test]
    fn encoded_body_layout() {
        let bind = BindRequest::builder()
            .system_id("foo")
            .password("bar")
            .system_type("VMS")
            .addr_ton(TypeOfNumber::International)
            .addr_npi(NumericPlanIndicator::Isdn)
            .build()
            .unwrap();

        let mut buf = BytesMut::new();
        bind.encode(&mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            b"foo\0bar\0VMS\0\x34\x01\x01\0".as_slice()
        );
        assert_eq!(bind.encoded_size(), buf.len());
    }

    #[test]
    fn bind_mode_ids() {
        assert_eq!(
            BindMode::Receiver.response_id(),
            CommandId::BindReceiverResp
        );
        assert_eq!(
            BindMode::Transmitter.response_id(),
            CommandId::BindTransmitterResp
        );
    }

    #[test]
    fn error_response_without_body_decodes() {
        let header = PduHeader {
            command_length: 16,
            command_id: CommandId::BindTransceiverResp,
            command_status: CommandStatus::BindFailed,
            sequence_number: 3,
        };
        let empty: &[u8] = &[];
        let mut cursor = Cursor::new(empty);
        let response = BindResponse::decode(&header, &mut cursor).unwrap();
        assert_eq!(response.system_id, "");
        assert!(response.tlvs.is_empty());
        assert_eq!(response.command_status, CommandStatus::BindFailed);
    }
}
