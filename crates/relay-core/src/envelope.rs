//! Outbound relay envelope.

/// One outbound message, constructed fresh per recipient per inbound
/// message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEnvelope {
    /// Session id of the originating client.
    pub sender: String,
    /// Session id of the client this copy is addressed to.
    pub recipient: String,
    /// The sender's message, unmodified.
    pub payload: String,
}

impl RelayEnvelope {
    pub fn new(sender: &str, recipient: &str, payload: &str) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            payload: payload.to_string(),
        }
    }

    /// Wire form: `[sender=>recipient]: payload`.
    pub fn render(&self) -> String {
        format!("[{}=>{}]: {}", self.sender, self.recipient, self.payload)
    }
}
