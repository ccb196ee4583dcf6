// ABOUTME: This module provides macros to reduce boilerplate in SMPP PDU implementations
// ABOUTME: Includes macros for header-only PDUs and fluent builder setters

/// Macro for declaring a header-only PDU (no body)
///
/// Generates the struct itself with `command_status` and `sequence_number`,
/// empty-body Encodable/Decodable implementations, and `new`/`error`
/// constructors.
///
/// # Arguments
/// * `$meta` - Attributes (usually doc comments) for the generated struct
/// * `$pdu_type` - The PDU struct name (e.g., EnquireLink)
macro_rules! header_only_pdu {
    ($(#[$meta:meta])* $pdu_type:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $pdu_type {
            pub command_status: $crate::datatypes::CommandStatus,
            pub sequence_number: u32,
        }

        impl $pdu_type {
            /// Create a new PDU with Ok status
            pub fn new(sequence_number: u32) -> Self {
                Self {
                    command_status: $crate::datatypes::CommandStatus::Ok,
                    sequence_number,
                }
            }

            /// Create a PDU with error status
            pub fn error(sequence_number: u32, status: $crate::datatypes::CommandStatus) -> Self {
                Self {
                    command_status: status,
                    sequence_number,
                }
            }
        }

        impl $crate::codec::Decodable for $pdu_type {
            fn decode(
                header: &$crate::codec::PduHeader,
                _buf: &mut std::io::Cursor<&[u8]>,
            ) -> Result<Self, $crate::codec::CodecError> {
                // Anything after the header is reported by the caller as trailing bytes
                Ok($pdu_type {
                    command_status: header.command_status,
                    sequence_number: header.sequence_number,
                })
            }
        }

        impl $crate::codec::Encodable for $pdu_type {
            fn encode(&self, _buf: &mut bytes::BytesMut) -> Result<(), $crate::codec::CodecError> {
                Ok(())
            }

            fn encoded_size(&self) -> usize {
                0
            }
        }
    };
}

/// Macro for generating builder setter methods
///
/// For each field, generates a fluent setter that takes the value, stores it
/// and returns self for method chaining.
macro_rules! builder_setters {
    ($($field:ident: $type:ty),* $(,)?) => {
        $(
            pub fn $field(mut self, $field: $type) -> Self {
                self.$field = $field;
                self
            }
        )*
    };
}

/// Macro for generating builder setters for C-Octet String fields
///
/// Same as `builder_setters!` but accepts anything convertible into a String.
macro_rules! string_setters {
    ($($field:ident),* $(,)?) => {
        $(
            pub fn $field(mut self, $field: impl Into<String>) -> Self {
                self.$field = $field.into();
                self
            }
        )*
    };
}

// Make macros available to the rest of the crate
pub(crate) use {builder_setters, header_only_pdu, string_setters};
