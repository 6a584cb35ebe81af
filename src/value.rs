// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::str;

use bytes::Bytes;

/// Any RESP payload a client sends or receives.
///
/// Simple strings (`+OK`) decode to `BulkString`, and error replies (`-ERR ...`) surface as
/// [`crate::Error::Server`] instead of a value, so the client never needs to encode either.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    BulkString(Bytes),
    Array(Vec<Value>),
}

impl Value {
    pub fn bulk(data: impl Into<Bytes>) -> Value {
        Value::BulkString(data.into())
    }

    /// Builds a request the way clients send commands to the server: an array of bulk strings.
    ///
    /// ```
    /// use rustdis_client::Value;
    ///
    /// let set = Value::command(["SET", "key", "value"]);
    /// assert_eq!(set.serialize(), b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
    /// ```
    pub fn command<I, A>(args: I) -> Value
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Value::Array(args.into_iter().map(Value::bulk).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::BulkString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The UTF-8 text of a bulk string, if it is one and the bytes are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| str::from_utf8(bytes).ok())
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::BulkString(Bytes::from(s))
    }
}

impl From<Bytes> for Value {
    fn from(bytes: Bytes) -> Self {
        Value::BulkString(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, ":{}", i),
            Value::BulkString(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Value::Null => write!(f, "$-1"),
            Value::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for value in arr {
                    write!(f, "\r\n{}", value)?;
                }
                Ok(())
            }
        }
    }
}
