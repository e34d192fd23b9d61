//! SWIM-style failure detection.
//!
//! Each probe period one member is pinged directly. If no ack arrives within the ping
//! timeout, a handful of relay members are asked to ping it on our behalf; if none of
//! them reports back before the ping-request timeout, a `Suspect(member)` signal is
//! raised. What happens to a suspected member is up to whoever listens.
//!
//! Requests and acks are correlated by per-instance sequence numbers; every outstanding
//! sequence owns exactly one timer, and clearing a sequence is idempotent.

pub mod correlation;
pub mod layer;
pub mod membership;
pub mod messages;
pub mod rounds;
pub mod signal;
pub mod transport;

pub use layer::{DetectorHandle, FailureDetector};
pub use membership::{MemberList, Membership};
pub use messages::{CodecError, Inbound, Member, MemberId, MessageKind, ProbeMessage};
pub use transport::{InboundSender, Transport, UdpTransport};
