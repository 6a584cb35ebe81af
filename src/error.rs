use std::io;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Malformed framing: unknown leading byte, bad length or integer field.
    #[error("protocol error; {0}")]
    Protocol(String),
    #[error("protocol error; bulk string of {len} bytes exceeds the {max} byte limit")]
    BulkTooLong { len: usize, max: usize },
    /// An error reply (`-...`) sent by the server.
    #[error("{0}")]
    Server(String),
    #[error("connection error; {0}")]
    Connection(#[from] io::Error),
    /// The reply stream is out of step with the requests; the connection must be closed.
    #[error("connection is desynchronized and must be closed before reuse")]
    Desynchronized,
    #[error("pipeline aborted at reply {index}: {source}")]
    Pipeline {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn is_protocol(&self) -> bool {
        match self {
            Error::Protocol(_) | Error::BulkTooLong { .. } => true,
            Error::Pipeline { source, .. } => source.is_protocol(),
            _ => false,
        }
    }

    pub fn is_server(&self) -> bool {
        match self {
            Error::Server(_) => true,
            Error::Pipeline { source, .. } => source.is_server(),
            _ => false,
        }
    }

    pub fn is_connection(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Desynchronized => true,
            Error::Pipeline { source, .. } => source.is_connection(),
            _ => false,
        }
    }

    pub(crate) fn closed_by_peer() -> Error {
        Error::Connection(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        ))
    }

    pub(crate) fn not_connected() -> Error {
        Error::Connection(io::Error::new(
            io::ErrorKind::NotConnected,
            "connection is not established",
        ))
    }
}

impl From<&str> for Error {
    fn from(src: &str) -> Error {
        Error::Protocol(src.to_string())
    }
}

impl From<String> for Error {
    fn from(src: String) -> Error {
        Error::Protocol(src)
    }
}
