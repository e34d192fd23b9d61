use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::messages::Member;

/// Observers of `Suspect(member)`. Closed receivers are dropped on the next emit.
#[derive(Debug, Default)]
pub struct SuspectListeners {
    listeners: Vec<UnboundedSender<Member>>,
}

impl SuspectListeners {
    pub fn subscribe(&mut self) -> UnboundedReceiver<Member> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    pub fn emit(&mut self, member: &Member) {
        self.listeners
            .retain(|listener| listener.send(member.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
