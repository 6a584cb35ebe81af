use bytes::BytesMut;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::codec;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::transport::{TcpTransport, Transport};
use crate::value::Value;
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    NotConnected,
    Connected,
    /// The reply stream no longer lines up with the requests sent. Only `close` is accepted.
    Error,
}

/// One RESP conversation over one transport.
///
/// Requests and replies are strictly FIFO: every queued request must eventually be matched by
/// exactly one `receive`.
pub struct Connection<T: Transport = TcpTransport> {
    pub id: Uuid,
    transport: Option<T>,
    state: State,
    config: Config,
    // Requests are encoded here before being handed to the transport.
    buffer: BytesMut,
}

impl<T: Transport> Connection<T> {
    /// Connects to `addr`. A failed connect is not an error here: the connection is returned in
    /// the `NotConnected` state and every request on it fails.
    pub async fn open(addr: &str, config: Config) -> Connection<T> {
        let id = Uuid::new_v4();
        let transport = match T::connect(addr, &config).await {
            Ok(transport) => {
                info!(%id, addr, "connected");
                Some(transport)
            }
            Err(e) => {
                warn!(%id, addr, error = %e, "failed to connect");
                None
            }
        };

        Connection::build(id, transport, config)
    }

    /// Wraps an already established transport.
    pub fn new(transport: T) -> Connection<T> {
        Connection::with_config(transport, Config::default())
    }

    pub fn with_config(transport: T, config: Config) -> Connection<T> {
        Connection::build(Uuid::new_v4(), Some(transport), config)
    }

    fn build(id: Uuid, transport: Option<T>, config: Config) -> Connection<T> {
        let state = if transport.is_some() {
            State::Connected
        } else {
            State::NotConnected
        };

        Connection {
            id,
            transport,
            state,
            buffer: BytesMut::with_capacity(config.write_buffer_capacity),
            config,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    pub fn pipeline(&mut self) -> Pipeline<'_, T> {
        Pipeline::new(self)
    }

    /// Writes `request` into the transport's buffer without flushing or reading a reply.
    #[instrument(name = "queue", skip_all, fields(connection_id = %self.id))]
    pub async fn queue(&mut self, request: &Value) -> Result<(), Error> {
        debug!("Queueing request: {}", request);

        let transport = ready(self.state, &mut self.transport)?;

        self.buffer.clear();
        codec::encode(request, &mut self.buffer);

        let res = transport.write(&self.buffer).await;
        self.check_io(res)
    }

    /// Writes `request`, flushes it and waits for its reply.
    pub async fn send(&mut self, request: &Value) -> Result<Value, Error> {
        self.queue(request).await?;
        self.flush().await?;
        self.receive().await
    }

    #[instrument(name = "flush", skip_all, fields(connection_id = %self.id))]
    pub async fn flush(&mut self) -> Result<(), Error> {
        let res = ready(self.state, &mut self.transport)?.flush().await;
        self.check_io(res)
    }

    /// Reads one reply. An error reply from the server is returned as [`Error::Server`] and
    /// leaves the connection usable, also when the error sits inside an array reply: the whole
    /// array is consumed before the error is returned.
    #[instrument(name = "receive", skip_all, fields(connection_id = %self.id))]
    pub async fn receive(&mut self) -> Result<Value, Error> {
        let max_bulk_len = self.config.max_bulk_len;
        let transport = ready(self.state, &mut self.transport)?;
        let res = codec::decode(transport, max_bulk_len).await;

        match res {
            Ok(value) => {
                debug!("Received reply: {}", value);
                Ok(value)
            }
            Err(Error::Connection(e)) => {
                self.drop_transport();
                Err(Error::Connection(e))
            }
            Err(err) if err.is_protocol() => {
                self.desynchronize();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Closes the transport. Closing a connection that is not connected does nothing.
    #[instrument(name = "close", skip_all, fields(connection_id = %self.id))]
    pub async fn close(&mut self) -> Result<(), Error> {
        let Some(mut transport) = self.transport.take() else {
            self.state = State::NotConnected;
            return Ok(());
        };
        self.state = State::NotConnected;

        info!("Connection closed");
        transport.close().await?;
        Ok(())
    }

    pub(crate) fn desynchronize(&mut self) {
        if self.state == State::Connected {
            warn!(connection_id = %self.id, "connection desynchronized");
            self.state = State::Error;
        }
    }

    #[cfg(test)]
    pub(crate) fn transport_ref(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    fn check_io(&mut self, res: std::io::Result<()>) -> Result<(), Error> {
        res.map_err(|e| {
            self.drop_transport();
            Error::Connection(e)
        })
    }

    fn drop_transport(&mut self) {
        if self.transport.take().is_some() {
            warn!(connection_id = %self.id, "transport failed, connection dropped");
        }
        self.state = State::NotConnected;
    }
}

fn ready<T>(state: State, transport: &mut Option<T>) -> Result<&mut T, Error> {
    match (state, transport.as_mut()) {
        (State::Connected, Some(transport)) => Ok(transport),
        (State::Error, _) => Err(Error::Desynchronized),
        _ => Err(Error::not_connected()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use bytes::Bytes;

    #[tokio::test]
    async fn queue_writes_without_flushing() {
        let mut conn = Connection::new(MockTransport::default());

        conn.queue(&Value::command(["GET", "k"])).await.unwrap();

        let transport = conn.transport.as_ref().unwrap();
        assert_eq!(transport.written, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert_eq!(transport.flushes, 0);
        assert_eq!(transport.line_reads, 0);
    }

    #[tokio::test]
    async fn send_flushes_and_reads_reply() {
        let mut conn = Connection::new(MockTransport::with_input(b"$1\r\nv\r\n"));

        let reply = conn.send(&Value::command(["GET", "k"])).await.unwrap();

        assert_eq!(reply, Value::BulkString(Bytes::from("v")));
        let transport = conn.transport.as_ref().unwrap();
        assert_eq!(transport.flushes, 1);
        assert_eq!(transport.pending, 0);
    }

    #[tokio::test]
    async fn server_error_keeps_connection_usable() {
        let mut conn = Connection::new(MockTransport::with_input(b"-ERR nope\r\n:1\r\n"));

        let err = conn.receive().await.unwrap_err();
        assert!(err.is_server());
        assert_eq!(conn.state(), State::Connected);

        assert_eq!(conn.receive().await.unwrap(), Value::Integer(1));
    }

    #[tokio::test]
    async fn server_error_inside_array_keeps_replies_aligned() {
        let mut conn = Connection::new(MockTransport::with_input(b"*2\r\n-ERR inner\r\n:1\r\n:99\r\n"));

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, Error::Server(ref msg) if msg == "ERR inner"));
        assert_eq!(conn.state(), State::Connected);

        assert_eq!(conn.receive().await.unwrap(), Value::Integer(99));
    }

    #[tokio::test]
    async fn queue_on_closed_connection_encodes_nothing() {
        let mut conn = Connection::new(MockTransport::default());
        conn.close().await.unwrap();

        let err = conn.queue(&Value::command(["GET", "k"])).await.unwrap_err();
        assert!(err.is_connection());
        assert!(conn.buffer.is_empty());
    }

    #[tokio::test]
    async fn protocol_error_desynchronizes() {
        let mut conn = Connection::new(MockTransport::with_input(b"!bad\r\n"));

        let err = conn.receive().await.unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(conn.state(), State::Error);

        let err = conn.queue(&Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Desynchronized));

        conn.close().await.unwrap();
        assert_eq!(conn.state(), State::NotConnected);
    }

    #[tokio::test]
    async fn peer_close_drops_transport() {
        let mut conn = Connection::new(MockTransport::default());

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(conn.state(), State::NotConnected);
        assert!(conn.transport.is_none());
    }

    #[tokio::test]
    async fn write_failure_drops_transport() {
        let transport = MockTransport {
            fail_writes: true,
            ..Default::default()
        };
        let mut conn = Connection::new(transport);

        let err = conn.queue(&Value::from("x")).await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(conn.state(), State::NotConnected);
    }

    #[tokio::test]
    async fn failed_open_is_not_connected() {
        let mut conn: Connection<MockTransport> =
            Connection::open("127.0.0.1:1", Config::default()).await;

        assert_eq!(conn.state(), State::NotConnected);

        let err = conn.send(&Value::command(["PING"])).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ref e) if e.kind() == std::io::ErrorKind::NotConnected
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut conn = Connection::new(MockTransport::default());

        conn.close().await.unwrap();
        assert_eq!(conn.state(), State::NotConnected);

        conn.close().await.unwrap();
        assert_eq!(conn.state(), State::NotConnected);
    }
}
