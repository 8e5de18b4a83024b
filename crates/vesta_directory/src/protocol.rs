//! JSON-lines wire protocol between directory clients and a hosting node.
//!
//! Each connection carries one request line. `put` and `get` receive one
//! response line and the connection closes; `listen` keeps the connection
//! open and receives a `values` line for every publication under the key.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::DirectoryError;

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Publish a value.
    Put {
        /// Directory key.
        key: String,
        /// Value to add.
        value: String,
    },
    /// Snapshot read.
    Get {
        /// Directory key.
        key: String,
    },
    /// Subscribe to publications.
    Listen {
        /// Directory key.
        key: String,
    },
}

/// A host response or notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    /// The request succeeded with no payload.
    Ok,
    /// The values under the requested key.
    Values {
        /// Values in arrival order.
        values: Vec<String>,
    },
    /// The request failed.
    Error {
        /// Reason given by the host.
        reason: String,
    },
}

/// Encodes a message as one newline-terminated JSON line.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, DirectoryError> {
    let mut line = serde_json::to_string(msg).map_err(|e| DirectoryError::Protocol {
        reason: e.to_string(),
    })?;
    line.push('\n');
    Ok(line)
}

/// Decodes one JSON line.
pub fn decode<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, DirectoryError> {
    serde_json::from_str(line).map_err(|e| DirectoryError::Protocol {
        reason: format!("{e}: {line}"),
    })
}

/// Line reader over the read half of a connection.
pub type LineReader = Lines<BufReader<OwnedReadHalf>>;

/// Wraps a read half for line-at-a-time decoding.
pub fn line_reader(read: OwnedReadHalf) -> LineReader {
    BufReader::new(read).lines()
}

/// Writes one message line.
pub async fn write_message<T: Serialize>(
    write: &mut OwnedWriteHalf,
    msg: &T,
    addr: &str,
) -> Result<(), DirectoryError> {
    write
        .write_all(encode(msg)?.as_bytes())
        .await
        .map_err(|e| DirectoryError::Io {
            addr: addr.to_string(),
            source: e,
        })
}

/// Reads and decodes the next message line, or `None` at end of stream.
pub async fn read_message<T: for<'de> Deserialize<'de>>(
    lines: &mut LineReader,
    addr: &str,
) -> Result<Option<T>, DirectoryError> {
    let line = lines.next_line().await.map_err(|e| DirectoryError::Io {
        addr: addr.to_string(),
        source: e,
    })?;
    match line {
        Some(line) => decode(&line).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let line = encode(&Request::Put {
            key: "vc_sort_0_256".to_string(),
            value: "127.0.0.1:9000".to_string(),
        })
        .unwrap();
        assert_eq!(
            line,
            "{\"op\":\"put\",\"key\":\"vc_sort_0_256\",\"value\":\"127.0.0.1:9000\"}\n"
        );
    }

    #[test]
    fn decode_values_response() {
        let resp: Response = decode(r#"{"op":"values","values":["a","b"]}"#).unwrap();
        assert_eq!(
            resp,
            Response::Values {
                values: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn decode_ok_response() {
        let resp: Response = decode(r#"{"op":"ok"}"#).unwrap();
        assert_eq!(resp, Response::Ok);
    }

    #[test]
    fn decode_garbage_is_protocol_error() {
        let err = decode::<Request>("not json").unwrap_err();
        assert!(matches!(err, DirectoryError::Protocol { .. }));
    }

    #[test]
    fn decode_unknown_op_is_protocol_error() {
        assert!(decode::<Request>(r#"{"op":"delete","key":"k"}"#).is_err());
    }
}
