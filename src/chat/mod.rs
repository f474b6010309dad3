pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod transcript;

pub use protocol::{ChatEvent, EventKind, OutgoingMessage, Timestamp, Username};
pub use registry::{ClientRegistry, MAX_CLIENTS, PeerHandle, RegisterError};
pub use room::Room;
pub use server::{ChatServer, load_logo, run, serve};
pub use transcript::Transcript;
