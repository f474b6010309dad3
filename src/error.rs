use tokio_util::codec::AnyDelimiterCodecError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    General(String),
    Io(std::io::Error),
    Codec(AnyDelimiterCodecError),
    InvalidPort(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Error::InvalidPort(port) => write!(fmt, "invalid port {port:?}: expected 4 digits"),
            other => write!(fmt, "{other:?}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

// A line over the codec's max length, or an io failure underneath it
impl From<AnyDelimiterCodecError> for Error {
    fn from(value: AnyDelimiterCodecError) -> Self {
        match value {
            AnyDelimiterCodecError::Io(e) => Self::Io(e),
            other => Self::Codec(other),
        }
    }
}
