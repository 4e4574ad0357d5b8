//! Channel-filtered, distance-stamped fan-out of a transmitted batch.

use greennet_shared::{distance, OutboundMessage};
use std::sync::Arc;

use crate::registry::Registry;
use crate::session::Session;

/// Outcome of one dispatch, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sessions that received at least one message.
    pub recipients: usize,
    /// Messages appended across all mailboxes.
    pub delivered: usize,
    /// Parked listeners woken by this dispatch.
    pub woken: usize,
}

/// Deliver `batch` from `origin` to every other live session.
///
/// Each recipient is handled under its own state lock only, and the lock is
/// released before moving on, so one contended session cannot hold up the
/// rest. Within a recipient, messages keep batch order.
pub fn dispatch(
    registry: &Registry,
    origin: &Arc<Session>,
    batch: &[OutboundMessage],
) -> DispatchReport {
    let mut report = DispatchReport::default();
    if batch.is_empty() {
        return report;
    }

    for recipient in registry.snapshot() {
        // No self-delivery, even when the sender listens on the channel.
        if Arc::ptr_eq(&recipient, origin) {
            continue;
        }

        let (delivered, woken) = deliver_to(&recipient, origin, batch);
        if delivered > 0 {
            report.recipients += 1;
            report.delivered += delivered;
        }
        if woken {
            report.woken += 1;
        }
    }

    report
}

/// Append the matching part of `batch` to one mailbox and try to wake its
/// listener. Returns how many messages matched and whether a listener took
/// the mailbox.
fn deliver_to(recipient: &Session, origin: &Session, batch: &[OutboundMessage]) -> (usize, bool) {
    // Positions never change after registration.
    let distance = distance(recipient.position(), origin.position());

    let mut state = recipient.lock_state();
    let before = state.mailbox.len();
    for message in batch {
        if state.open_channels.contains(&message.channel) {
            let stamped = message.deliver(distance);
            state.mailbox.push(stamped);
        }
    }
    let delivered = state.mailbox.len() - before;

    let woken = delivered > 0 && state.hand_off();
    (delivered, woken)
}
