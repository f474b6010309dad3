pub mod chat;
pub mod cmd;
pub mod error;
pub mod tracer;

pub use error::{Error, Result};
