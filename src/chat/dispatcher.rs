use super::protocol::*;
use super::registry::Client;
use super::room::RoomState;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

/// The only writer to other clients. Consumes events in the order the room
/// recorded them and fans each out to a copy of the registry.
pub struct Dispatcher {
    state: Arc<Mutex<RoomState>>,
    receiver: mpsc::UnboundedReceiver<ChatEvent>,
}

impl Dispatcher {
    pub fn new(state: Arc<Mutex<RoomState>>, receiver: mpsc::UnboundedReceiver<ChatEvent>) -> Self {
        Self { state, receiver }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            // lock only long enough to copy the registry
            let clients = self.state.lock().await.registry.snapshot();
            let delivered = deliver(&event, &clients);
            trace!(seq = event.seq, delivered, "dispatched {:?}", event.kind);
        }
        debug!("event queue closed, dispatcher stopping");
    }
}

/// Writes `event` followed by each recipient's own prompt. Skips the sender
/// for joins and chat, and anyone whose replay already held this line.
/// Returns how many clients accepted the write; failures are logged and skipped.
pub fn deliver(event: &ChatEvent, clients: &[Client]) -> usize {
    let msg = event.broadcast();
    let recipients = clients
        .iter()
        .filter(|client| event.reaches_sender() || client.handle.address() != event.address)
        .filter(|client| event.seq > client.joined_seq);

    let mut delivered = 0;
    for client in recipients {
        match client
            .handle
            .send(msg.clone())
            .and_then(|_| client.handle.send(client.prompt()))
        {
            Ok(()) => delivered += 1,
            Err(e) => debug!(seq = event.seq, "write to {} dropped: {}", client.name, e),
        }
    }
    delivered
}
