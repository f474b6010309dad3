use super::dispatcher::Dispatcher;
use super::protocol::*;
use super::registry::*;
use super::transcript::Transcript;
use core::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info};

/// Registry and transcript behind one lock, so a join or leave and its
/// transcript line are observed together.
#[derive(Debug)]
pub struct RoomState {
    pub registry: ClientRegistry,
    pub transcript: Transcript,
}

impl RoomState {
    // append, persist, and stamp the event with its line number
    async fn record(&mut self, mut event: ChatEvent) -> ChatEvent {
        event.seq = self.transcript.append(&event.transcript_line());
        if let Err(e) = self.transcript.flush().await {
            error!("failed to persist transcript: {}", e);
        }
        event
    }
}

#[derive(Debug)]
pub struct Joined {
    pub name: Username,
    // transcript as it was right before this client's join line
    pub replay: String,
}

#[derive(Debug, Clone)]
pub struct Room {
    state: Arc<Mutex<RoomState>>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl Room {
    /// Creates the room and spawns its dispatcher on the current runtime.
    pub fn new(transcript: Transcript) -> Room {
        let state = Arc::new(Mutex::new(RoomState {
            registry: ClientRegistry::new(),
            transcript,
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Dispatcher::new(state.clone(), rx).run());
        Room { state, events: tx }
    }

    pub async fn is_full(&self) -> bool {
        self.state.lock().await.registry.is_full()
    }

    pub async fn join(
        &self,
        name: &str,
        handle: PeerHandle,
        timestamp: Timestamp,
    ) -> Result<Joined, RegisterError> {
        let address = handle.address();
        let mut state = self.state.lock().await;

        let replay = state.transcript.snapshot();
        let joined_seq = state.transcript.len() + 1;
        let name = state
            .registry
            .try_register(name, handle, timestamp.clone(), joined_seq)?;

        let event = state
            .record(ChatEvent::join(name.clone(), timestamp, address))
            .await;
        self.dispatch(event);

        info!("{} connected from {}", name, address);
        Ok(Joined { name, replay })
    }

    pub async fn post(
        &self,
        name: &Username,
        timestamp: &Timestamp,
        address: SocketAddr,
        text: String,
    ) {
        let mut state = self.state.lock().await;
        let event = state
            .record(ChatEvent::message(
                name.clone(),
                timestamp.clone(),
                address,
                text,
            ))
            .await;
        self.dispatch(event);
    }

    pub async fn leave(&self, name: &Username, timestamp: &Timestamp, address: SocketAddr) {
        let mut state = self.state.lock().await;
        if state.registry.unregister(name).is_none() {
            return;
        }
        let event = state
            .record(ChatEvent::leave(name.clone(), timestamp.clone(), address))
            .await;
        self.dispatch(event);

        info!("{} disconnected", name);
    }

    #[cfg(test)]
    pub(crate) async fn clients(&self) -> Vec<Client> {
        self.state.lock().await.registry.snapshot()
    }

    #[cfg(test)]
    pub(crate) async fn transcript(&self) -> String {
        self.state.lock().await.transcript.snapshot()
    }

    // called with the state lock held, which keeps the queue in transcript order
    fn dispatch(&self, event: ChatEvent) {
        if self.events.send(event).is_err() {
            error!("dispatcher is gone, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> (PeerHandle, Outbox) {
        PeerHandle::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[tokio::test]
    async fn join_replays_transcript_before_own_join_line() {
        let room = Room::new(Transcript::in_memory());
        let (alice, _a) = peer(1);
        let (bob, _b) = peer(2);

        let first = room.join("alice", alice, Timestamp::now()).await.unwrap();
        assert_eq!(first.replay, "");

        let second = room.join("bob", bob, Timestamp::now()).await.unwrap();
        assert_eq!(second.replay, "alice has joined our chat...\n");
        assert_eq!(
            room.transcript().await,
            "alice has joined our chat...\nbob has joined our chat...\n"
        );
    }

    #[tokio::test]
    async fn rejected_join_leaves_no_trace() {
        let room = Room::new(Transcript::in_memory());
        let (alice, _a) = peer(1);
        let (other, _b) = peer(2);
        room.join("alice", alice, Timestamp::now()).await.unwrap();

        let err = room.join("alice", other, Timestamp::now()).await.unwrap_err();
        assert!(matches!(err, RegisterError::NameTaken(_)));
        assert_eq!(room.clients().await.len(), 1);
        assert_eq!(room.transcript().await, "alice has joined our chat...\n");
    }

    #[tokio::test]
    async fn post_and_leave_are_transcribed() {
        let room = Room::new(Transcript::in_memory());
        let (alice, _a) = peer(1);
        let ts: Timestamp = Timestamp::now();
        let joined = room.join("alice", alice, ts.clone()).await.unwrap();
        let address = SocketAddr::from(([127, 0, 0, 1], 1));

        room.post(&joined.name, &ts, address, "hi".into()).await;
        room.leave(&joined.name, &ts, address).await;
        // second leave is a no-op
        room.leave(&joined.name, &ts, address).await;

        assert_eq!(
            room.transcript().await,
            format!(
                "alice has joined our chat...\n[{ts}][alice]: hi\nalice has left our chat...\n"
            )
        );
        assert!(room.clients().await.is_empty());
        assert!(!room.is_full().await);
    }

    #[tokio::test]
    async fn transcript_file_tracks_every_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.txt");
        let room = Room::new(Transcript::persistent(&path));
        let (alice, _a) = peer(1);

        let joined = room.join("alice", alice, Timestamp::now()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "alice has joined our chat...\n"
        );

        room.leave(&joined.name, &Timestamp::now(), SocketAddr::from(([127, 0, 0, 1], 1)))
            .await;
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "alice has joined our chat...\nalice has left our chat...\n"
        );
    }

    #[tokio::test]
    async fn concurrent_joins_never_exceed_capacity() {
        let room = Room::new(Transcript::in_memory());
        let mut tasks = vec![];
        for i in 0..25u16 {
            let room = room.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, outbox) = peer(i + 1);
                let result = room.join(&format!("user{i}"), handle, Timestamp::now()).await;
                (result.is_ok(), outbox)
            }));
        }

        let mut accepted = 0;
        let mut outboxes = vec![];
        for task in tasks {
            let (ok, outbox) = task.await.unwrap();
            accepted += ok as usize;
            outboxes.push(outbox);
        }

        assert_eq!(accepted, MAX_CLIENTS);
        assert_eq!(room.clients().await.len(), MAX_CLIENTS);
        assert_eq!(room.transcript().await.lines().count(), MAX_CLIENTS);
    }
}
