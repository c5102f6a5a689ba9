//! Feedback suppression
//!
//! Every activation we announce comes back from the surface as a trigger. The
//! `0` halves are dropped outright and a repeated `1` for the active scene is
//! only re-affirmed, so the loop settles after one round trip.

use super::trigger::InboundMessage;

/// A zero-valued trigger (`0`, `0.0`, `false`) is a release or an echo of our
/// own deactivation
pub fn is_echo(message: &InboundMessage) -> bool {
    message.is_release()
}

/// The candidate is the scene already active
pub fn is_reaffirm(active: Option<&str>, candidate: &str) -> bool {
    active == Some(candidate)
}
