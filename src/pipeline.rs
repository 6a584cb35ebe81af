use tracing::{debug, instrument, warn};

use crate::connection::Connection;
use crate::transport::Transport;
use crate::value::Value;
use crate::Error;

/// Batches requests so they reach the server in a single flush.
///
/// Replies come back in submission order: `execute()[i]` is the reply to the `i`-th `command`.
/// RESP has no request ids, so this only holds because one connection is one ordered stream.
///
/// ```no_run
/// # async fn run() -> Result<(), rustdis_client::Error> {
/// use rustdis_client::{Config, Connection, TcpTransport, Value};
///
/// let mut conn: Connection<TcpTransport> = Connection::open("127.0.0.1:6379", Config::default()).await;
/// let mut pipeline = conn.pipeline();
/// pipeline.command(&Value::command(["SET", "k", "v"])).await?;
/// pipeline.command(&Value::command(["GET", "k"])).await?;
/// let replies = pipeline.execute().await?;
/// assert_eq!(replies[1], Value::from("v"));
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<'a, T: Transport> {
    conn: &'a mut Connection<T>,
    queued: usize,
}

impl<'a, T: Transport> Pipeline<'a, T> {
    pub fn new(conn: &'a mut Connection<T>) -> Pipeline<'a, T> {
        Pipeline { conn, queued: 0 }
    }

    /// Queues `request`. Its reply is only available from [`Pipeline::execute`].
    pub async fn command(&mut self, request: &Value) -> Result<(), Error> {
        self.conn.queue(request).await?;
        self.queued += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    /// Flushes once, then reads exactly one reply per queued command.
    ///
    /// The first failing reply aborts the batch with [`Error::Pipeline`] carrying its index. The
    /// replies after it are left unread, so the connection is marked desynchronized and has to be
    /// closed before it can be used again.
    #[instrument(name = "pipeline", skip_all, fields(connection_id = %self.conn.id, commands = self.queued))]
    pub async fn execute(mut self) -> Result<Vec<Value>, Error> {
        // Taken up front so that dropping `self` below never counts these as abandoned.
        let queued = std::mem::take(&mut self.queued);
        self.conn.flush().await?;

        let mut replies = Vec::with_capacity(queued);
        for index in 0..queued {
            match self.conn.receive().await {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    warn!(index, error = %err, "pipeline aborted");
                    self.conn.desynchronize();
                    return Err(Error::Pipeline {
                        index,
                        source: Box::new(err),
                    });
                }
            }
        }

        debug!("Pipeline drained {} replies", replies.len());
        Ok(replies)
    }
}

/// A pipeline dropped with commands still queued leaves their replies owed by the server, so the
/// connection can no longer pair requests with replies.
impl<T: Transport> Drop for Pipeline<'_, T> {
    fn drop(&mut self) {
        if self.queued > 0 {
            warn!(commands = self.queued, "pipeline dropped without execute");
            self.conn.desynchronize();
        }
    }
}
