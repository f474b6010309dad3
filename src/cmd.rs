use crate::{Error, Result};
use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8989;
pub const USAGE: &str = "[USAGE]: ./TCPChat $port";

#[derive(Parser, Debug)]
#[clap(version, about, override_usage = "./TCPChat $port")]
pub struct Args {
    /// Listening port, exactly 4 digits
    pub port: Option<String>,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Banner sent to every client after the welcome line
    #[arg(long, default_value = "./logo.txt")]
    pub logo: PathBuf,

    /// Transcript file, rewritten after every chat event
    #[arg(long, default_value = "history.txt")]
    pub history: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub logo_path: PathBuf,
    pub history_path: PathBuf,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<Args> for ServerConfig {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self> {
        let port = match args.port {
            Some(port) => parse_port(&port)?,
            None => DEFAULT_PORT,
        };
        Ok(ServerConfig {
            host: args.host,
            port,
            logo_path: args.logo,
            history_path: args.history,
        })
    }
}

/// What the process should do with its command line.
#[derive(Debug)]
pub enum Invocation {
    Serve { config: ServerConfig, json_logs: bool },
    /// Wrong arity, unknown flag or a malformed port.
    Usage,
    /// `--help` or `--version`; clap prints these itself.
    Info(clap::Error),
}

pub fn parse_invocation<I, T>(argv: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let args = match Args::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => return Invocation::Info(e),
            _ => return Invocation::Usage,
        },
    };
    let json_logs = args.json_logs;
    match ServerConfig::try_from(args) {
        Ok(config) => Invocation::Serve { config, json_logs },
        Err(_) => Invocation::Usage,
    }
}

pub fn parse_port(arg: &str) -> Result<u16> {
    if arg.len() != 4 || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidPort(arg.to_string()));
    }
    arg.parse::<u16>()
        .map_err(|_| Error::InvalidPort(arg.to_string()))
}
