use std::collections::HashMap;
use tokio::time::Instant;

use super::correlation::Timer;
use super::messages::Member;

pub type RoundId = u64;

/// One indirect-probe invocation against a single target.
#[derive(Debug)]
pub struct SuspicionRound {
    pub(super) target: Member,
    pub(super) legs: Vec<u64>,
    pub(super) started_at: Instant,
    _timer: Timer,
}

#[derive(Debug, Default)]
pub struct SuspicionRounds {
    next_id: RoundId,
    rounds: HashMap<RoundId, SuspicionRound>,
}

impl SuspicionRounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> RoundId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn open(&mut self, id: RoundId, target: Member, timer: Timer) {
        self.rounds.insert(
            id,
            SuspicionRound {
                target,
                legs: Vec::new(),
                started_at: Instant::now(),
                _timer: timer,
            },
        );
    }

    pub fn add_leg(&mut self, id: RoundId, seq: u64) {
        if let Some(round) = self.rounds.get_mut(&id) {
            round.legs.push(seq);
        }
    }

    /// Cancels the round's timer. Only the first call for a round returns it.
    pub fn cancel(&mut self, id: RoundId) -> Option<SuspicionRound> {
        self.rounds.remove(&id)
    }

    /// Ends a round whose timer fired, returning the member to suspect.
    pub fn expire(&mut self, id: RoundId) -> Option<Member> {
        self.rounds.remove(&id).map(|round| round.target)
    }

    pub fn clear_all(&mut self) -> usize {
        let cleared = self.rounds.len();
        self.rounds.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}
