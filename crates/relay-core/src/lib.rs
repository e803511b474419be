//! Shared library for fanout-relay.
//!
//! Defines the outbound relay envelope, the error taxonomy, and session-id
//! generation. No I/O lives in this crate.

pub mod envelope;
pub mod error;
pub mod ids;

pub use envelope::RelayEnvelope;
pub use error::{RelayError, RelayResult};
pub use ids::generate_session_id;
