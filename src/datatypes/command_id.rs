use num_enum::TryFromPrimitive;

/// The command_id field identifies the SMPP PDU. Requests have the high bit
/// clear, responses have it set.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    GenericNack = 0x8000_0000,
    BindReceiver = 0x0000_0001,
    BindReceiverResp = 0x8000_0001,
    BindTransmitter = 0x0000_0002,
    BindTransmitterResp = 0x8000_0002,
    SubmitSm = 0x0000_0004,
    SubmitSmResp = 0x8000_0004,
    DeliverSm = 0x0000_0005,
    DeliverSmResp = 0x8000_0005,
    Unbind = 0x0000_0006,
    UnbindResp = 0x8000_0006,
    BindTransceiver = 0x0000_0009,
    BindTransceiverResp = 0x8000_0009,
    EnquireLink = 0x0000_0015,
    EnquireLinkResp = 0x8000_0015,
}

impl CommandId {
    /// Check if this command_id represents a response PDU
    pub fn is_response(&self) -> bool {
        (*self as u32) & 0x8000_0000 != 0
    }

    /// The command_id a peer must answer this request with.
    ///
    /// Returns `None` for responses. GenericNack is a valid answer to any
    /// request but is never the *expected* one.
    pub fn response_id(&self) -> Option<CommandId> {
        if self.is_response() {
            return None;
        }
        CommandId::try_from((*self as u32) | 0x8000_0000).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_bit() {
        assert!(!CommandId::EnquireLink.is_response());
        assert!(CommandId::EnquireLinkResp.is_response());
        assert!(CommandId::GenericNack.is_response());
        assert!(!CommandId::SubmitSm.is_response());
    }

    #[test]
    fn response_id_pairs_requests() {
        assert_eq!(
            CommandId::BindTransceiver.response_id(),
            Some(CommandId::BindTransceiverResp)
        );
        assert_eq!(CommandId::DeliverSm.response_id(), Some(CommandId::DeliverSmResp));
        assert_eq!(CommandId::UnbindResp.response_id(), None);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        assert!(CommandId::try_from(0x0000_000Au32).is_err());
        assert!(CommandId::try_from(0x0000_0103u32).is_err());
    }
}
