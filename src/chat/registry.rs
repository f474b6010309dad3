use super::protocol::*;
use crate::{Error, Result};
use core::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};

pub const MAX_CLIENTS: usize = 10;
// pending broadcast writes per client before new ones are dropped
pub const OUTBOX_CAPACITY: usize = 256;

pub type Outbox = mpsc::Receiver<OutgoingMessage>;

/// Write side of one connection. Anything sent here is forwarded to the
/// socket by the session that owns the matching [`Outbox`].
#[derive(Debug, Clone)]
pub struct PeerHandle {
    address: SocketAddr,
    sender: mpsc::Sender<OutgoingMessage>,
}

impl PeerHandle {
    pub fn new(address: SocketAddr) -> (PeerHandle, Outbox) {
        let (sender, receiver) = mpsc::channel(OUTBOX_CAPACITY);
        (PeerHandle { address, sender }, receiver)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Never waits: a client that stops reading loses writes instead of
    /// holding up the dispatcher.
    pub fn send(&self, msg: OutgoingMessage) -> Result<()> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => Error::General(format!("client {} is not reading", self.address)),
            TrySendError::Closed(_) => Error::General(format!("client {} disconnected", self.address)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    pub name: Username,
    // fixed when the client joined, reused in every prompt
    pub timestamp: Timestamp,
    pub handle: PeerHandle,
    // transcript line of this client's own join announcement
    pub joined_seq: u64,
}

impl Client {
    pub fn prompt(&self) -> OutgoingMessage {
        OutgoingMessage::Prompt {
            timestamp: self.timestamp.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(derive_more::Display, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[display("room is full")]
    RoomFull,
    #[display("name {} is already taken", _0)]
    NameTaken(Username),
    #[display("invalid name: {}", _0)]
    InvalidName(NameError),
    #[display("{} is already registered", _0)]
    DuplicateAddress(SocketAddr),
}

impl RegisterError {
    /// Inline notice for rejections the client may retry after.
    pub fn notice(&self) -> Option<OutgoingMessage> {
        match self {
            RegisterError::InvalidName(NameError::Blank) => Some(OutgoingMessage::IncorrectName),
            RegisterError::InvalidName(NameError::TooLong) => Some(OutgoingMessage::NameTooLong),
            RegisterError::NameTaken(_) => Some(OutgoingMessage::NameTaken),
            RegisterError::RoomFull | RegisterError::DuplicateAddress(_) => None,
        }
    }
}

/// Connected clients in join order. Callers hold the room lock for every
/// access, so the registry itself is plain data.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_register(
        &mut self,
        name: &str,
        handle: PeerHandle,
        timestamp: Timestamp,
        joined_seq: u64,
    ) -> core::result::Result<Username, RegisterError> {
        if self.is_full() {
            return Err(RegisterError::RoomFull);
        }
        let name = Username::parse(name).map_err(RegisterError::InvalidName)?;
        if self.contains(&name) {
            return Err(RegisterError::NameTaken(name));
        }
        if self
            .clients
            .iter()
            .any(|c| c.handle.address() == handle.address())
        {
            return Err(RegisterError::DuplicateAddress(handle.address()));
        }

        self.clients.push(Client {
            name: name.clone(),
            timestamp,
            handle,
            joined_seq,
        });
        Ok(name)
    }

    pub fn unregister(&mut self, name: &Username) -> Option<Client> {
        let index = self.clients.iter().position(|c| &c.name == name)?;
        Some(self.clients.remove(index))
    }

    pub fn contains(&self, name: &Username) -> bool {
        self.clients.iter().any(|c| &c.name == name)
    }

    pub fn snapshot(&self) -> Vec<Client> {
        self.clients.clone()
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= MAX_CLIENTS
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
