// Protocol specification: https://redis.io/docs/reference/protocol-spec/

use std::slice;
use std::str;

use bytes::{BufMut, BytesMut};

use crate::transport::Transport;
use crate::value::Value;
use crate::Error;

static CRLF: &[u8; 2] = b"\r\n";
static NULL_BULK: &[u8; 5] = b"$-1\r\n";

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::Protocol(format!(
                "invalid frame data type: {:?}",
                byte as char
            ))),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

/// Appends the wire representation of `value` to `dst`.
///
/// Nested arrays are walked with an explicit stack of element iterators, so encoding never
/// recurses however deep the value is.
pub fn encode(value: &Value, dst: &mut BytesMut) {
    let mut stack: Vec<slice::Iter<'_, Value>> = Vec::new();
    let mut next = Some(value);

    while let Some(value) = next.take() {
        match value {
            // *<number-of-elements>\r\n<element-1>...<element-n>
            Value::Array(arr) => {
                dst.put_u8(u8::from(DataType::Array));
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                stack.push(arr.iter());
            }
            value => encode_scalar(value, dst),
        }

        while let Some(items) = stack.last_mut() {
            if let Some(item) = items.next() {
                next = Some(item);
                break;
            }
            stack.pop();
        }
    }
}

fn encode_scalar(value: &Value, dst: &mut BytesMut) {
    match value {
        Value::Null => dst.extend_from_slice(NULL_BULK),
        Value::Integer(i) => {
            dst.put_u8(u8::from(DataType::Integer));
            dst.extend_from_slice(i.to_string().as_bytes());
            dst.extend_from_slice(CRLF);
        }
        // $<length>\r\n<data>\r\n
        Value::BulkString(bytes) => {
            let length_str = bytes.len().to_string();
            dst.reserve(1 + length_str.len() + CRLF.len() + bytes.len() + CRLF.len());
            dst.put_u8(u8::from(DataType::BulkString));
            dst.extend_from_slice(length_str.as_bytes());
            dst.extend_from_slice(CRLF);
            dst.extend_from_slice(bytes);
            dst.extend_from_slice(CRLF);
        }
        Value::Array(_) => encode(value, dst),
    }
}

impl Value {
    pub fn serialize(&self) -> Vec<u8> {
        let mut dst = BytesMut::new();
        encode(self, &mut dst);
        dst.to_vec()
    }
}

impl From<Value> for Vec<u8> {
    fn from(value: Value) -> Self {
        value.serialize()
    }
}

/// An array still waiting for some of its elements.
struct PartialArray {
    items: Vec<Value>,
    len: usize,
}

/// Reads exactly one reply from `src`.
///
/// Arrays are assembled on an explicit stack rather than by recursion, so arbitrarily deep
/// nesting costs heap, not call stack. Dropping or printing such a value still recurses.
///
/// An error reply nested inside an array does not cut the array short: the remaining elements
/// are still read, so the stream stays aligned with the next reply, and the first nested error
/// is returned once the outermost array is complete.
pub async fn decode<T: Transport>(src: &mut T, max_bulk_len: usize) -> Result<Value, Error> {
    let mut stack: Vec<PartialArray> = Vec::new();
    let mut nested_error: Option<Error> = None;

    loop {
        let header = match decode_header(src, max_bulk_len).await {
            Ok(header) => header,
            Err(err @ Error::Server(_)) if !stack.is_empty() => {
                nested_error.get_or_insert(err);
                Header::Value(Value::Null)
            }
            Err(err) => return Err(err),
        };

        let mut value = match header {
            Header::Value(value) => value,
            Header::Array(0) => Value::Array(Vec::new()),
            Header::Array(len) => {
                stack.push(PartialArray {
                    items: Vec::with_capacity(len.min(1024)),
                    len,
                });
                continue;
            }
        };

        // Hand the finished value to its parent, completing as many arrays as it fills.
        loop {
            let Some(parent) = stack.last_mut() else {
                return match nested_error {
                    Some(err) => Err(err),
                    None => Ok(value),
                };
            };
            parent.items.push(value);
            if parent.items.len() < parent.len {
                break;
            }
            let done = stack.pop().map(|array| array.items).unwrap_or_default();
            value = Value::Array(done);
        }
    }
}

enum Header {
    Value(Value),
    Array(usize),
}

async fn decode_header<T: Transport>(src: &mut T, max_bulk_len: usize) -> Result<Header, Error> {
    let line = match src.read_line().await? {
        Some(line) if !line.is_empty() => line,
        _ => return Err(Error::closed_by_peer()),
    };

    // The first byte in an RESP-serialized payload always identifies its type.
    // Subsequent bytes constitute the type's contents.
    let data_type = DataType::try_from(line[0])?;
    let rest = &line[1..];

    match data_type {
        DataType::SimpleError => Err(Error::Server(utf8(rest)?.to_string())),
        DataType::SimpleString => Ok(Header::Value(Value::bulk(utf8(rest)?.to_string()))),
        DataType::Integer => Ok(Header::Value(Value::Integer(parse_int(rest)?))),
        DataType::BulkString => {
            let len = match parse_len(rest)? {
                Some(len) => len,
                None => return Ok(Header::Value(Value::Null)),
            };
            if len > max_bulk_len {
                return Err(Error::BulkTooLong {
                    len,
                    max: max_bulk_len,
                });
            }

            let data = src.read_exact(len).await?;
            let trailer = src.read_exact(CRLF.len()).await?;
            if &trailer[..] != CRLF {
                return Err("bulk string is not terminated by CRLF".into());
            }

            Ok(Header::Value(Value::BulkString(data)))
        }
        DataType::Array => match parse_len(rest)? {
            Some(len) => Ok(Header::Array(len)),
            // RESP2 null array.
            None => Ok(Header::Value(Value::Null)),
        },
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, Error> {
    str::from_utf8(bytes).map_err(|_| "invalid frame format; not valid UTF-8".into())
}

fn parse_int(bytes: &[u8]) -> Result<i64, Error> {
    let text = utf8(bytes)?;
    text.parse::<i64>()
        .map_err(|e| Error::Protocol(format!("invalid integer {:?}: {}", text, e)))
}

/// Length prefix of a bulk string or array; `None` for the `-1` null marker.
fn parse_len(bytes: &[u8]) -> Result<Option<usize>, Error> {
    match parse_int(bytes)? {
        -1 => Ok(None),
        len if len < 0 => Err(Error::Protocol(format!("invalid length {}", len))),
        len => usize::try_from(len)
            .map(Some)
            .map_err(|_| Error::Protocol(format!("length {} does not fit in memory", len))),
    }
}
