use super::protocol::*;
use super::registry::{Outbox, PeerHandle, RegisterError};
use super::room::Room;
use crate::{Error, Result};
use core::net::SocketAddr;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

enum SessionState {
    Connecting,
    Negotiating,
    Active(Membership),
    Terminated,
}

// What a client holds once its name is registered.
struct Membership {
    room: Room,
    name: Username,
    timestamp: Timestamp,
    address: SocketAddr,
    // messages from the dispatcher for this client
    outbox: Outbox,
    // sent before anything else once active
    replay: String,
}

impl Membership {
    fn prompt(&self) -> OutgoingMessage {
        OutgoingMessage::Prompt {
            timestamp: self.timestamp.clone(),
            name: self.name.clone(),
        }
    }

    async fn post(&self, text: String) {
        self.room
            .post(&self.name, &self.timestamp, self.address, text)
            .await
    }

    async fn leave(self) {
        self.room
            .leave(&self.name, &self.timestamp, self.address)
            .await
    }
}

pub async fn handle_client(
    room: Room,
    logo: Arc<str>,
    stream: TcpStream,
    address: SocketAddr,
) -> Result<()> {
    let (sink, stream) = Framed::new(stream, ChatCodec::new()).split();
    run_session(room, logo, address, sink, stream).await
}

/// Drives one connection from accept to close.
pub async fn run_session<I, O>(
    room: Room,
    logo: Arc<str>,
    address: SocketAddr,
    mut sink: O,
    mut stream: I,
) -> Result<()>
where
    I: Stream<Item = Result<String>> + Unpin,
    O: Sink<OutgoingMessage, Error = Error> + Unpin,
{
    let mut state = SessionState::Connecting;
    loop {
        state = match state {
            SessionState::Connecting => connect(&room, &logo, &mut sink).await?,
            SessionState::Negotiating => {
                negotiate(&room, address, &mut sink, &mut stream).await?
            }
            SessionState::Active(member) => chat(member, &mut sink, &mut stream).await,
            SessionState::Terminated => break,
        };
    }

    let _ = sink.close().await;
    Ok(())
}

async fn connect<O>(room: &Room, logo: &str, sink: &mut O) -> Result<SessionState>
where
    O: Sink<OutgoingMessage, Error = Error> + Unpin,
{
    if room.is_full().await {
        debug!("room is full, turning connection away");
        sink.send(OutgoingMessage::RoomFull).await?;
        return Ok(SessionState::Terminated);
    }

    sink.send(OutgoingMessage::Welcome).await?;
    sink.send(OutgoingMessage::Logo(logo.to_string())).await?;
    Ok(SessionState::Negotiating)
}

async fn negotiate<I, O>(
    room: &Room,
    address: SocketAddr,
    sink: &mut O,
    stream: &mut I,
) -> Result<SessionState>
where
    I: Stream<Item = Result<String>> + Unpin,
    O: Sink<OutgoingMessage, Error = Error> + Unpin,
{
    let (handle, outbox) = PeerHandle::new(address);

    loop {
        sink.send(OutgoingMessage::EnterName).await?;

        let line = match stream.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                debug!("{} dropped before choosing a name: {}", address, e);
                return Ok(SessionState::Terminated);
            }
            None => return Ok(SessionState::Terminated),
        };

        let timestamp = Timestamp::now();
        match room.join(&line, handle.clone(), timestamp.clone()).await {
            Ok(joined) => {
                return Ok(SessionState::Active(Membership {
                    room: room.clone(),
                    name: joined.name,
                    timestamp,
                    address,
                    outbox,
                    replay: joined.replay,
                }));
            }
            Err(e) => match e.notice() {
                Some(notice) => sink.send(notice).await?,
                None => {
                    warn!("{} rejected: {}", address, e);
                    if e == RegisterError::RoomFull {
                        sink.send(OutgoingMessage::RoomFull).await?;
                    }
                    return Ok(SessionState::Terminated);
                }
            },
        }
    }
}

// Always ends in Terminated, after the client has left the room.
async fn chat<I, O>(mut member: Membership, sink: &mut O, stream: &mut I) -> SessionState
where
    I: Stream<Item = Result<String>> + Unpin,
    O: Sink<OutgoingMessage, Error = Error> + Unpin,
{
    if let Err(e) = converse(&mut member, sink, stream).await {
        debug!("{} ({}) connection failed: {}", member.name, member.address, e);
    }
    member.leave().await;
    SessionState::Terminated
}

async fn converse<I, O>(member: &mut Membership, sink: &mut O, stream: &mut I) -> Result<()>
where
    I: Stream<Item = Result<String>> + Unpin,
    O: Sink<OutgoingMessage, Error = Error> + Unpin,
{
    let replay = std::mem::take(&mut member.replay);
    if !replay.is_empty() {
        sink.send(OutgoingMessage::Replay(replay)).await?;
    }
    sink.send(member.prompt()).await?;

    loop {
        tokio::select! {
            Some(msg) = member.outbox.recv() => {
                sink.send(msg).await?;
            }

            result = stream.next() => match result {
                Some(Ok(line)) => {
                    if !is_blank(&line) {
                        member.post(line).await;
                    }
                    sink.send(member.prompt()).await?;
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            }
        }
    }
}
