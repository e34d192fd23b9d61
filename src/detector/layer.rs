use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, info_span, warn};

use super::correlation::{Completion, CorrelationTable, Event, Pending, Timer};
use super::membership::Membership;
use super::messages::{Inbound, Member, MessageKind, ProbeMessage};
use super::rounds::{RoundId, SuspicionRounds};
use super::signal::SuspectListeners;
use super::transport::Transport;
use crate::config::DetectorConfig;

/// Probe engine for one local node.
///
/// All state is owned by a single task once [`FailureDetector::start`] is called:
/// inbound messages, timer expirations, deferred ack completions and probe ticks are
/// handled one at a time, so the correlation table needs no locking.
pub struct FailureDetector<T: Transport, M: Membership> {
    config: DetectorConfig,
    local: Member,
    transport: Arc<T>,
    membership: Arc<M>,
    table: CorrelationTable,
    rounds: SuspicionRounds,
    suspects: SuspectListeners,
    events: UnboundedSender<Event>,
    events_rx: Option<UnboundedReceiver<Event>>,
}

impl<T: Transport, M: Membership> FailureDetector<T, M> {
    pub fn new(config: DetectorConfig, local: Member, transport: Arc<T>, membership: Arc<M>) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            local,
            transport,
            membership,
            table: CorrelationTable::new(),
            rounds: SuspicionRounds::new(),
            suspects: SuspectListeners::default(),
            events,
            events_rx: Some(events_rx),
        }
    }

    /// Registers an observer for `Suspect(member)` signals.
    pub fn on_suspect(&mut self) -> UnboundedReceiver<Member> {
        self.suspects.subscribe()
    }

    pub fn pending(&self) -> usize {
        self.table.len()
    }

    /// Subscribes to the transport and starts probing: once immediately, then every `interval`.
    /// Inbound messages are accepted as soon as this returns.
    pub fn start(mut self) -> DetectorHandle {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        for kind in MessageKind::ALL {
            self.transport.subscribe(kind, inbound_tx.clone());
        }
        drop(inbound_tx);

        let events = self
            .events_rx
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);

        let (stop, stop_rx) = oneshot::channel();
        let span = info_span!("detector", label = %self.config.label);
        let task = tokio::spawn(self.run(events, inbound, stop_rx).instrument(span));

        DetectorHandle { stop, task }
    }

    async fn run(
        mut self,
        mut events: UnboundedReceiver<Event>,
        mut inbound: UnboundedReceiver<Inbound>,
        mut stop: oneshot::Receiver<()>,
    ) {
        info!("Failure detector started for {}", self.local);

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                Some(event) = events.recv() => self.handle_event(event),
                Some(message) = inbound.recv() => self.handle_inbound(message),
                _ = ticker.tick() => self.probe_next(),
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        for kind in MessageKind::ALL {
            self.transport.unsubscribe(kind);
        }

        let sequences = self.table.clear_all();
        let rounds = self.rounds.clear_all();
        info!(
            "Failure detector stopped, discarded {} pending sequences and {} open rounds",
            sequences, rounds
        );
    }

    fn probe_next(&mut self) {
        let target = self.membership.next();
        self.ping_member(target);
    }

    pub(crate) fn ping_member(&mut self, member: Option<Member>) {
        let Some(member) = member else {
            debug!("No member to probe");
            return;
        };

        let seq = self.table.next_sequence();
        let timer = Timer::arm(
            self.config.ping_timeout,
            &self.events,
            Event::SequenceExpired(seq),
        );
        let addr = member.addr;
        debug!("Pinging member {} with seq {}", member, seq);
        self.table.insert(seq, Pending::DirectAck { target: member }, timer);

        self.transport.send(
            ProbeMessage::Ping {
                seq,
                host: self.local.clone(),
            },
            addr,
        );
    }

    pub(crate) fn ping_req(&mut self, target: Member) {
        let relays = self
            .membership
            .relays(self.config.ping_req_group_size, &target);

        if relays.is_empty() && !self.config.suspect_without_relays {
            warn!("No members available for indirect ping of {}", target);
            return;
        }

        let round = self.rounds.next_id();
        let timer = Timer::arm(
            self.config.ping_req_timeout,
            &self.events,
            Event::RoundExpired(round),
        );
        self.rounds.open(round, target.clone(), timer);

        info!(
            "Sending {} indirect ping requests for {} via {:?}",
            relays.len(),
            target,
            relays.iter().map(|m| &m.id.0).collect::<Vec<_>>()
        );

        for relay in relays {
            self.send_relay_leg(round, &target, relay);
        }
    }

    fn send_relay_leg(&mut self, round: RoundId, target: &Member, relay: Member) {
        let seq = self.table.next_sequence();
        let timer = Timer::arm(
            self.config.relay_leg_timeout(),
            &self.events,
            Event::SequenceExpired(seq),
        );
        let addr = relay.addr;
        debug!(
            "Sent indirect ping request {} to {} for target {}",
            seq, relay, target
        );
        self.table.insert(seq, Pending::RelayAck { round, relay }, timer);
        self.rounds.add_leg(round, seq);

        self.transport.send(
            ProbeMessage::PingReq {
                seq,
                host: self.local.clone(),
                destination: target.clone(),
            },
            addr,
        );
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::SequenceExpired(seq) => self.on_sequence_expired(seq),
            Event::RoundExpired(round) => self.on_round_expired(round),
            Event::Completed { seq, completion } => self.complete(seq, completion),
        }
    }

    fn on_sequence_expired(&mut self, seq: u64) {
        match self.table.clear(seq) {
            Some(Pending::DirectAck { target }) => {
                warn!("No direct ack from {} - trying indirect pings", target);
                self.ping_req(target);
            }
            Some(Pending::RelayAck { round, relay }) => {
                debug!("Relay leg {} via {} for round {} expired", seq, relay, round);
            }
            Some(Pending::OnBehalfAck {
                forward_to,
                destination,
                ..
            }) => {
                debug!(
                    "Probe {} of {} on behalf of {} expired",
                    seq, destination, forward_to
                );
            }
            None => debug!("Sequence {} expired after it was cleared", seq),
        }
    }

    fn on_round_expired(&mut self, round: RoundId) {
        if let Some(target) = self.rounds.expire(round) {
            warn!("All indirect pings failed for {} - raising suspicion", target);
            self.suspects.emit(&target);
        }
    }

    fn complete(&mut self, seq: u64, completion: Completion) {
        match completion {
            Completion::CancelRound(round) => {
                self.table.clear(seq);
                match self.rounds.cancel(round) {
                    Some(settled) => info!(
                        "Target {} confirmed reachable via relay after {:?} ({} legs)",
                        settled.target,
                        settled.started_at.elapsed(),
                        settled.legs.len()
                    ),
                    None => debug!("Round {} already settled, ignoring leg {}", round, seq),
                }
            }
            Completion::ForwardAck { to, seq: original } => {
                debug!("Forwarding ack {} to {} as {}", seq, to, original);
                self.transport.send(
                    ProbeMessage::Ack {
                        seq: original,
                        host: None,
                    },
                    to,
                );
            }
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        let Inbound { message, from } = inbound;

        match message {
            ProbeMessage::Ping { seq, host } => {
                debug!("Handling Ping {} from {}", seq, host);
                self.transport.send(
                    ProbeMessage::Ack {
                        seq,
                        host: Some(self.local.clone()),
                    },
                    from,
                );
            }

            ProbeMessage::PingReq {
                seq,
                host,
                destination,
            } => {
                debug!(
                    "Handling PingReq {} from {} to ping {}",
                    seq, host, destination
                );
                self.ping_on_behalf(seq, destination, from);
            }

            ProbeMessage::Ack { seq, .. } => self.handle_ack(seq, from),
        }
    }

    fn ping_on_behalf(&mut self, original_seq: u64, destination: Member, forward_to: SocketAddr) {
        let seq = self.table.next_sequence();
        let timer = Timer::arm(
            self.config.ping_timeout,
            &self.events,
            Event::SequenceExpired(seq),
        );
        let addr = destination.addr;
        self.table.insert(
            seq,
            Pending::OnBehalfAck {
                forward_to,
                original_seq,
                destination,
            },
            timer,
        );

        self.transport.send(
            ProbeMessage::Ping {
                seq,
                host: self.local.clone(),
            },
            addr,
        );
    }

    /// Completions are posted back to the task rather than run inline, then the sequence
    /// is cleared unconditionally. Stray and duplicate acks fall through as no-ops.
    fn handle_ack(&mut self, seq: u64, from: SocketAddr) {
        match self.table.completion(seq) {
            Some(completion) => {
                let _ = self.events.send(Event::Completed { seq, completion });
            }
            None if self.table.contains(seq) => debug!("Direct ack {} from {}", seq, from),
            None => debug!("Ignoring unmatched ack {} from {}", seq, from),
        }
        self.table.clear(seq);
    }
}

/// Running detector. Dropping the handle stops the detector as well.
pub struct DetectorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl DetectorHandle {
    /// Unsubscribes from the transport and discards every pending sequence and round
    /// without running their completions.
    pub async fn stop(self) -> Result<()> {
        let DetectorHandle { stop, task } = self;
        let _ = stop.send(());
        task.await?;
        Ok(())
    }
}
