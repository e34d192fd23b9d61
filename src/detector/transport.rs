use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use super::messages::{Inbound, MessageKind, ProbeMessage};

pub type InboundSender = UnboundedSender<Inbound>;

/// Unordered, unacknowledged message delivery.
pub trait Transport: Send + Sync + 'static {
    /// Routes inbound messages of `kind` to `handler`, replacing any previous handler.
    fn subscribe(&self, kind: MessageKind, handler: InboundSender);

    fn unsubscribe(&self, kind: MessageKind);

    /// Fire-and-forget.
    fn send(&self, message: ProbeMessage, target: SocketAddr);
}

pub struct UdpTransport {
    local_addr: SocketAddr,
    handlers: Arc<DashMap<MessageKind, InboundSender>>,
    outbound: UnboundedSender<(ProbeMessage, SocketAddr)>,
    receiver: AbortHandle,
}

impl UdpTransport {
    pub async fn bind(bind_addr: SocketAddr) -> Result<Arc<Self>> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;
        debug!("Probe transport bound to {}", local_addr);

        let handlers = Arc::new(DashMap::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::write_loop(socket.clone(), outbound_rx));
        let receiver = tokio::spawn(Self::read_loop(socket, handlers.clone())).abort_handle();

        Ok(Arc::new(Self {
            local_addr,
            handlers,
            outbound,
            receiver,
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn write_loop(
        socket: Arc<UdpSocket>,
        mut outbound: UnboundedReceiver<(ProbeMessage, SocketAddr)>,
    ) {
        while let Some((message, target)) = outbound.recv().await {
            let bytes = match message.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", message, e);
                    continue;
                }
            };

            match socket.send_to(&bytes, target).await {
                Ok(_) => debug!("Sent {:?} to {}", message, target),
                Err(e) => warn!("Failed to send {:?} to {}: {}", message.kind(), target, e),
            }
        }
    }

    async fn read_loop(socket: Arc<UdpSocket>, handlers: Arc<DashMap<MessageKind, InboundSender>>) {
        let mut buf = vec![0u8; 65535]; // Max UDP packet size

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, src_addr)) => match ProbeMessage::from_bytes(&buf[..len]) {
                    Ok(message) => {
                        debug!("Received {:?} from {}", message, src_addr);
                        dispatch(&handlers, Inbound {
                            message,
                            from: src_addr,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to deserialize message from {}: {}", src_addr, e);
                    }
                },
                Err(e) => {
                    error!("Error receiving UDP message: {}", e);
                }
            }
        }
    }
}

fn dispatch(handlers: &DashMap<MessageKind, InboundSender>, inbound: Inbound) {
    let kind = inbound.message.kind();
    match handlers.get(&kind) {
        Some(handler) => {
            if handler.send(inbound).is_err() {
                debug!("Handler for {:?} is gone", kind);
            }
        }
        None => debug!("No handler for {:?}, dropping message from {}", kind, inbound.from),
    }
}

impl Transport for UdpTransport {
    fn subscribe(&self, kind: MessageKind, handler: InboundSender) {
        self.handlers.insert(kind, handler);
    }

    fn unsubscribe(&self, kind: MessageKind) {
        self.handlers.remove(&kind);
    }

    fn send(&self, message: ProbeMessage, target: SocketAddr) {
        if self.outbound.send((message, target)).is_err() {
            warn!("Outbound queue closed, dropping message to {}", target);
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}
