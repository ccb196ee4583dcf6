use num_enum::{FromPrimitive, IntoPrimitive};
use std::ops::RangeInclusive;

/// Codes SMPP 3.4 leaves to SMSC vendors
pub const VENDOR_STATUS_RANGE: RangeInclusive<u32> = 0x0000_0400..=0x0000_04FF;

/// The command_status field of an SMPP response indicates the success or
/// failure of the matching request. Requests always carry `Ok`.
///
/// The set is closed apart from the vendor range, which is carried as
/// [`CommandStatus::Vendor`]. Any other code fails decoding, see
/// [`CommandStatus::from_code`].
#[derive(FromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// No Error
    Ok = 0x00000000,
    /// Message Length is invalid
    InvalidMsgLength = 0x00000001,
    /// Command Length is invalid
    InvalidCommandLength = 0x00000002,
    /// Invalid Command ID
    InvalidCommandId = 0x00000003,
    /// Incorrect BIND Status for given command
    IncorrectBindStatus = 0x00000004,
    /// ESME Already in Bound State
    AlreadyBoundState = 0x00000005,
    /// Invalid Priority Flag
    InvalidPriorityFlag = 0x00000006,
    /// Invalid Registered Delivery Flag
    InvalidRegisteredDeliveryFlag = 0x00000007,
    /// System Error
    SystemError = 0x00000008,
    /// Invalid Source Address
    InvalidSourceAddress = 0x0000000A,
    /// Invalid Dest Addr
    InvalidDestinationAddress = 0x0000000B,
    /// Message ID is invalid
    InvalidMessageId = 0x0000000C,
    /// Bind Failed
    BindFailed = 0x0000000D,
    /// Invalid Password
    InvalidPassword = 0x0000000E,
    /// Invalid System ID
    InvalidSystemId = 0x0000000F,
    /// Cancel SM Failed
    CancelSmFailed = 0x00000011,
    /// Replace SM Failed
    ReplaceSmFailed = 0x00000013,
    /// Message Queue Full
    MessageQueueFull = 0x00000014,
    /// Invalid Service Type
    InvalidServiceType = 0x00000015,
    /// Invalid number of destinations
    InvalidNumberOfDestinations = 0x00000033,
    /// Invalid Distribution List name
    InvalidDistributionListName = 0x00000034,
    /// Destination flag is invalid (submit_multi)
    InvalidDestinationFlag = 0x00000040,
    /// Invalid 'submit with replace' request
    InvalidSubmitWithReplaceRequest = 0x00000042,
    /// Invalid esm_class field data
    InvalidEsmClassFieldData = 0x00000043,
    /// Cannot Submit to Distribution List
    CannotSubmitToDistributionList = 0x00000044,
    /// submit_sm or submit_multi failed
    SubmitFailed = 0x00000045,
    /// Invalid Source address TON
    InvalidSourceAddressTon = 0x00000048,
    /// Invalid Source address NPI
    InvalidSourceAddressNpi = 0x00000049,
    /// Invalid Destination address TON
    InvalidDestinationAddressTon = 0x00000050,
    /// Invalid Destination address NPI
    InvalidDestinationAddressNpi = 0x00000051,
    /// Invalid system_type field
    InvalidSystemTypeField = 0x00000053,
    /// Invalid replace_if_present flag
    InvalidReplaceIfPresentFlag = 0x00000054,
    /// Invalid number of messages
    InvalidNumberOfMessages = 0x00000055,
    /// Throttling error (ESME has exceeded allowed message limits)
    ThrottlingError = 0x00000058,
    /// Invalid Scheduled Delivery Time
    InvalidScheduledDeliveryTime = 0x00000061,
    /// Invalid message validity period (Expiry time)
    InvalidExpiryTime = 0x00000062,
    /// Predefined Message Invalid or Not Found
    InvalidPredefinedMessageId = 0x00000063,
    /// ESME Receiver Temporary App Error Code
    ReceiverTemporaryAppError = 0x00000064,
    /// ESME Receiver Permanent App Error Code
    ReceiverPermanentAppError = 0x00000065,
    /// ESME Receiver Reject Message Error Code
    ReceiverRejectMessageError = 0x00000066,
    /// query_sm request failed
    QuerySmRequestFailed = 0x00000067,
    /// Error in the optional part of the PDU Body.
    ErrorInOptionalPartOfPduBody = 0x000000C0,
    /// Optional Parameter not allowed
    OptionalParameterNotAllowed = 0x000000C1,
    /// Invalid Parameter Length.
    InvalidParameterLength = 0x000000C2,
    /// Expected Optional Parameter missing
    ExpectedOptionalParameterMissing = 0x000000C3,
    /// Invalid Optional Parameter Value
    InvalidOptionalParameterValue = 0x000000C4,
    /// Delivery Failure (used for data_sm_resp)
    DeliveryFailed = 0x000000FE,
    /// Unknown Error
    UnknownError = 0x000000FF,
    /// Vendor-specific error in [`VENDOR_STATUS_RANGE`]
    #[num_enum(catch_all)]
    Vendor(u32),
}

impl CommandStatus {
    /// Decode a wire code. Codes that are neither defined nor in the
    /// vendor range are rejected.
    pub fn from_code(code: u32) -> Option<Self> {
        match CommandStatus::from(code) {
            CommandStatus::Vendor(code) if !VENDOR_STATUS_RANGE.contains(&code) => None,
            status => Some(status),
        }
    }

    pub fn code(&self) -> u32 {
        u32::from(*self)
    }

    pub fn is_ok(&self) -> bool {
        *self == CommandStatus::Ok
    }

    /// The ESME_* mnemonic used by the SMPP 3.4 specification.
    pub fn name(&self) -> &'static str {
        match self {
            CommandStatus::Ok => "ESME_ROK",
            CommandStatus::InvalidMsgLength => "ESME_RINVMSGLEN",
            CommandStatus::InvalidCommandLength => "ESME_RINVCMDLEN",
            CommandStatus::InvalidCommandId => "ESME_RINVCMDID",
            CommandStatus::IncorrectBindStatus => "ESME_RINVBNDSTS",
            CommandStatus::AlreadyBoundState => "ESME_RALYBND",
            CommandStatus::InvalidPriorityFlag => "ESME_RINVPRTFLG",
            CommandStatus::InvalidRegisteredDeliveryFlag => "ESME_RINVREGDLVFLG",
            CommandStatus::SystemError => "ESME_RSYSERR",
            CommandStatus::InvalidSourceAddress => "ESME_RINVSRCADR",
            CommandStatus::InvalidDestinationAddress => "ESME_RINVDSTADR",
            CommandStatus::InvalidMessageId => "ESME_RINVMSGID",
            CommandStatus::BindFailed => "ESME_RBINDFAIL",
            CommandStatus::InvalidPassword => "ESME_RINVPASWD",
            CommandStatus::InvalidSystemId => "ESME_RINVSYSID",
            CommandStatus::CancelSmFailed => "ESME_RCANCELFAIL",
            CommandStatus::ReplaceSmFailed => "ESME_RREPLACEFAIL",
            CommandStatus::MessageQueueFull => "ESME_RMSGQFUL",
            CommandStatus::InvalidServiceType => "ESME_RINVSERTYP",
            CommandStatus::InvalidNumberOfDestinations => "ESME_RINVNUMDESTS",
            CommandStatus::InvalidDistributionListName => "ESME_RINVDLNAME",
            CommandStatus::InvalidDestinationFlag => "ESME_RINVDESTFLAG",
            CommandStatus::InvalidSubmitWithReplaceRequest => "ESME_RINVSUBREP",
            CommandStatus::InvalidEsmClassFieldData => "ESME_RINVESMCLASS",
            CommandStatus::CannotSubmitToDistributionList => "ESME_RCNTSUBDL",
            CommandStatus::SubmitFailed => "ESME_RSUBMITFAIL",
            CommandStatus::InvalidSourceAddressTon => "ESME_RINVSRCTON",
            CommandStatus::InvalidSourceAddressNpi => "ESME_RINVSRCNPI",
            CommandStatus::InvalidDestinationAddressTon => "ESME_RINVDSTTON",
            CommandStatus::InvalidDestinationAddressNpi => "ESME_RINVDSTNPI",
            CommandStatus::InvalidSystemTypeField => "ESME_RINVSYSTYP",
            CommandStatus::InvalidReplaceIfPresentFlag => "ESME_RINVREPFLAG",
            CommandStatus::InvalidNumberOfMessages => "ESME_RINVNUMMSGS",
            CommandStatus::ThrottlingError => "ESME_RTHROTTLED",
            CommandStatus::InvalidScheduledDeliveryTime => "ESME_RINVSCHED",
            CommandStatus::InvalidExpiryTime => "ESME_RINVEXPIRY",
            CommandStatus::InvalidPredefinedMessageId => "ESME_RINVDFTMSGID",
            CommandStatus::ReceiverTemporaryAppError => "ESME_RX_T_APPN",
            CommandStatus::ReceiverPermanentAppError => "ESME_RX_P_APPN",
            CommandStatus::ReceiverRejectMessageError => "ESME_RX_R_APPN",
            CommandStatus::QuerySmRequestFailed => "ESME_RQUERYFAIL",
            CommandStatus::ErrorInOptionalPartOfPduBody => "ESME_RINVOPTPARSTREAM",
            CommandStatus::OptionalParameterNotAllowed => "ESME_ROPTPARNOTALLWD",
            CommandStatus::InvalidParameterLength => "ESME_RINVPARLEN",
            CommandStatus::ExpectedOptionalParameterMissing => "ESME_RMISSINGOPTPARAM",
            CommandStatus::InvalidOptionalParameterValue => "ESME_RINVOPTPARAMVAL",
            CommandStatus::DeliveryFailed => "ESME_RDELIVERYFAILURE",
            CommandStatus::UnknownError => "ESME_RUNKNOWNERR",
            CommandStatus::Vendor(_) => "VENDOR",
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_mnemonics() {
        assert_eq!(CommandStatus::Ok.name(), "ESME_ROK");
        assert_eq!(CommandStatus::InvalidPassword.name(), "ESME_RINVPASWD");
        assert_eq!(CommandStatus::ThrottlingError.name(), "ESME_RTHROTTLED");
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(
            CommandStatus::SystemError.to_string(),
            "ESME_RSYSERR (0x00000008)"
        );
    }

    #[test]
    fn reserved_codes_do_not_decode() {
        assert_eq!(CommandStatus::from_code(0x0000_0009), None);
        assert_eq!(CommandStatus::from_code(0x0000_0500), None);
        assert_eq!(
            CommandStatus::from_code(0x0000_0058),
            Some(CommandStatus::ThrottlingError)
        );
    }

    #[test]
    fn vendor_codes_keep_their_value() {
        let status = CommandStatus::from_code(0x0000_0401).unwrap();
        assert_eq!(status, CommandStatus::Vendor(0x401));
        assert_eq!(status.code(), 0x401);
        assert!(!status.is_ok());
        assert_eq!(status.to_string(), "VENDOR (0x00000401)");
        assert!(CommandStatus::from_code(0x0000_04FF).is_some());
    }
}
