use std::io;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

use crate::config::Config;

/// The byte stream a [`crate::Connection`] speaks RESP over.
///
/// Writes may be buffered until `flush`. Reads block the calling task until the requested bytes
/// arrive, the peer closes, or the underlying I/O fails.
#[allow(async_fn_in_trait)]
pub trait Transport: Sized {
    async fn connect(addr: &str, config: &Config) -> io::Result<Self>;

    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;

    /// Next line without its `\r\n` terminator, or `None` once the peer has closed the stream.
    async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;

    async fn read_exact(&mut self, len: usize) -> io::Result<Bytes>;

    async fn close(&mut self) -> io::Result<()>;
}

pub struct TcpTransport {
    stream: BufStream<TcpStream>,
    max_line_len: usize,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, config: &Config) -> TcpTransport {
        TcpTransport {
            stream: BufStream::with_capacity(
                config.read_buffer_capacity,
                config.write_buffer_capacity,
                stream,
            ),
            max_line_len: config.max_line_len,
        }
    }
}

impl Transport for TcpTransport {
    async fn connect(addr: &str, config: &Config) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        // Requests are flushed explicitly, Nagle would only delay them.
        stream.set_nodelay(true)?;
        Ok(TcpTransport::new(stream, config))
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }

    async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        // Room for the longest allowed line plus its CRLF.
        let limit = self.max_line_len.saturating_add(2);
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(limit as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if read == limit && line.last() != Some(&b'\n') {
            return Err(line_too_long(self.max_line_len));
        }
        strip_line_ending(&mut line)?;
        Ok(Some(line))
    }

    async fn read_exact(&mut self, len: usize) -> io::Result<Bytes> {
        let mut data = vec![0; len];
        self.stream.read_exact(&mut data).await?;
        Ok(Bytes::from(data))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

fn line_too_long(max: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line exceeds the {} byte limit", max),
    )
}

fn strip_line_ending(line: &mut Vec<u8>) -> io::Result<()> {
    if line.pop() != Some(b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended in the middle of a line",
        ));
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn strip_crlf_and_bare_lf() {
        let mut line = b"+OK\r\n".to_vec();
        strip_line_ending(&mut line).unwrap();
        assert_eq!(line, b"+OK");

        let mut line = b":1\n".to_vec();
        strip_line_ending(&mut line).unwrap();
        assert_eq!(line, b":1");
    }

    #[test]
    fn partial_line_is_unexpected_eof() {
        let mut line = b"$5".to_vec();
        let err = strip_line_ending(&mut line).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn tcp_read_line_and_exact() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"$5\r\nhello\r\n").await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr, &Config::default())
            .await
            .unwrap();

        assert_eq!(transport.read_line().await.unwrap(), Some(b"$5".to_vec()));
        assert_eq!(
            transport.read_exact(7).await.unwrap(),
            Bytes::from("hello\r\n")
        );
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn tcp_read_line_is_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"+0123456789\r\n").await.unwrap();
            // No newline ever follows.
            socket.write_all(&[b'a'; 64]).await.unwrap();
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
        });

        let config = Config {
            max_line_len: 16,
            ..Config::default()
        };
        let mut transport = TcpTransport::connect(&addr, &config).await.unwrap();

        assert_eq!(
            transport.read_line().await.unwrap(),
            Some(b"+0123456789".to_vec())
        );
        let err = transport.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
