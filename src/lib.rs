pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod pipeline;
pub mod transport;
pub mod value;

pub use config::Config;
pub use connection::{Connection, State};
pub use error::Error;
pub use pipeline::Pipeline;
pub use transport::{TcpTransport, Transport};
pub use value::Value;

pub type Result<T> = std::result::Result<T, Error>;
