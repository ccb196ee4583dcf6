// ABOUTME: Header-only SMPP PDUs: unbind, enquire_link, their responses and generic_nack
// ABOUTME: None of these carry a body; everything lives in the 16-byte header

use crate::macros::header_only_pdu;

header_only_pdu!(
    /// Sent by either peer to end the session. The receiver answers with
    /// `UnbindResponse` once its outstanding requests have settled.
    Unbind
);

header_only_pdu!(UnbindResponse);

header_only_pdu!(
    /// Link keep-alive, answered immediately with `EnquireLinkResponse`.
    EnquireLink
);

header_only_pdu!(EnquireLinkResponse);

header_only_pdu!(
    /// Negative acknowledgement for a PDU whose header could not be
    /// interpreted. Its sequence number echoes the offending PDU.
    GenericNack
);
