use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::debug;

use super::messages::Member;
use super::rounds::RoundId;

/// Events posted back to the detector task by timers and by the ack handler.
#[derive(Debug)]
pub(crate) enum Event {
    SequenceExpired(u64),
    RoundExpired(RoundId),
    Completed { seq: u64, completion: Completion },
}

/// One-shot timer that posts `event` after `after` unless cancelled. Dropping it cancels it.
#[derive(Debug)]
pub struct Timer {
    handle: AbortHandle,
}

impl Timer {
    pub fn arm<E: Send + 'static>(after: Duration, tx: &UnboundedSender<E>, event: E) -> Self {
        let tx = tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(event);
        });

        Self {
            handle: task.abort_handle(),
        }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What an outstanding sequence is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// Our own direct probe. Expiry escalates to an indirect probe.
    DirectAck { target: Member },
    /// One relay leg of a suspicion round. An ack cancels the round; expiry only cleans up.
    RelayAck { round: RoundId, relay: Member },
    /// A probe run on behalf of a requester. An ack is forwarded under the requester's sequence.
    OnBehalfAck {
        forward_to: SocketAddr,
        original_seq: u64,
        destination: Member,
    },
}

/// Deferred work to run once an ack has been matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    CancelRound(RoundId),
    ForwardAck { to: SocketAddr, seq: u64 },
}

impl Pending {
    pub fn completion(&self) -> Option<Completion> {
        match self {
            Pending::DirectAck { .. } => None,
            Pending::RelayAck { round, .. } => Some(Completion::CancelRound(*round)),
            Pending::OnBehalfAck {
                forward_to,
                original_seq,
                ..
            } => Some(Completion::ForwardAck {
                to: *forward_to,
                seq: *original_seq,
            }),
        }
    }
}

#[derive(Debug)]
struct Entry {
    pending: Pending,
    _timer: Timer,
}

/// Outstanding sequences, each holding exactly one live timer.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_seq: u64,
    entries: HashMap<u64, Entry>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequences start at zero and are never handed out twice.
    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn insert(&mut self, seq: u64, pending: Pending, timer: Timer) {
        debug_assert!(!self.entries.contains_key(&seq), "sequence {} reused", seq);
        self.entries.insert(
            seq,
            Entry {
                pending,
                _timer: timer,
            },
        );
    }

    pub fn completion(&self, seq: u64) -> Option<Completion> {
        self.entries
            .get(&seq)
            .and_then(|entry| entry.pending.completion())
    }

    /// Cancels the timer and forgets the sequence. Unknown sequences are ignored.
    pub fn clear(&mut self, seq: u64) -> Option<Pending> {
        self.entries.remove(&seq).map(|entry| entry.pending)
    }

    /// Drops every entry without running any completion.
    pub fn clear_all(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        if cleared > 0 {
            debug!("Force-cleared {} pending sequences", cleared);
        }
        cleared
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.contains_key(&seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
