mod bind;
mod command_id;
mod command_status;
mod header_only;
mod interface_version;
mod message;
mod numeric_plan_indicator;
mod tlv;
mod type_of_number;

pub use bind::{
    BindMode, BindRequest, BindRequestBuilder, BindResponse, BindValidationError, MAX_ADDRESS_RANGE_LENGTH,
    MAX_PASSWORD_LENGTH, MAX_SYSTEM_TYPE_LENGTH,
};
pub use command_id::CommandId;
pub use command_status::CommandStatus;
pub use header_only::{EnquireLink, EnquireLinkResponse, GenericNack, Unbind, UnbindResponse};
pub use interface_version::InterfaceVersion;
pub use message::{
    MessageRequest, MessageRequestBuilder, MessageResponse, MessageValidationError,
    MAX_ADDRESS_LENGTH, MAX_MESSAGE_ID_LENGTH, MAX_SERVICE_TYPE_LENGTH, MAX_SHORT_MESSAGE_LENGTH,
    MAX_TIME_LENGTH,
};
pub use numeric_plan_indicator::NumericPlanIndicator;
pub use tlv::{tags, Tlv};
pub use type_of_number::TypeOfNumber;

// Shared by bind requests and bind responses (excluding null terminator)
pub const MAX_SYSTEM_ID_LENGTH: usize = 16;
