//! Minimal RESP (Redis Serialization Protocol) codec for the session store client.
//!
//! Only what a client needs: encode a command as an array of bulk strings and
//! decode replies. Decoding never consumes a partial frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::str;
use thiserror::Error;

const MAX_PREALLOCATED_ELEMENTS: usize = 64;

/// RESP data types.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK\r\n`
    SimpleString(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:123\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`, `None` for the null bulk string.
    BulkString(Option<Bytes>),
    /// `*2\r\n...`, `None` for the null array.
    Array(Option<Vec<RespValue>>),
}

#[derive(Debug, Error)]
pub enum RespError {
    #[error("invalid RESP format: {0}")]
    InvalidFormat(String),
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] str::Utf8Error),
    #[error("invalid integer: {0}")]
    InvalidInteger(#[from] std::num::ParseIntError),
}

/// Encode `command args...` as a RESP array of bulk strings.
pub fn encode_command(buf: &mut BytesMut, command: &str, args: &[&str]) {
    buf.put_u8(b'*');
    buf.extend_from_slice((args.len() + 1).to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for part in std::iter::once(command).chain(args.iter().copied()) {
        buf.put_u8(b'$');
        buf.extend_from_slice(part.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.extend_from_slice(part.as_bytes());
        buf.put_slice(b"\r\n");
    }
}

/// Decode one complete value from the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched when the frame is incomplete.
pub fn decode(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
    match parse(buf, 0)? {
        Some((value, consumed)) => {
            buf.advance(consumed);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn parse(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some((line, next)) = read_line(buf, pos) else {
        return Ok(None);
    };
    if line.is_empty() {
        return Err(RespError::InvalidFormat("empty line".to_string()));
    }

    let content = &line[1..];
    match line[0] {
        b'+' => Ok(Some((
            RespValue::SimpleString(str::from_utf8(content)?.to_string()),
            next,
        ))),
        b'-' => Ok(Some((
            RespValue::Error(str::from_utf8(content)?.to_string()),
            next,
        ))),
        b':' => Ok(Some((RespValue::Integer(str::from_utf8(content)?.parse()?), next))),
        b'$' => {
            let size: i64 = str::from_utf8(content)?.parse()?;
            if size == -1 {
                return Ok(Some((RespValue::BulkString(None), next)));
            }
            let size = usize::try_from(size)
                .map_err(|_| RespError::InvalidFormat("invalid bulk string size".to_string()))?;

            let end = next
                .checked_add(size)
                .and_then(|n| n.checked_add(2))
                .ok_or_else(|| RespError::InvalidFormat("bulk string size out of range".to_string()))?;
            if buf.len() < end {
                return Ok(None);
            }
            if &buf[next + size..next + size + 2] != b"\r\n" {
                return Err(RespError::InvalidFormat(
                    "missing \\r\\n after bulk string".to_string(),
                ));
            }
            let data = Bytes::copy_from_slice(&buf[next..next + size]);
            Ok(Some((RespValue::BulkString(Some(data)), end)))
        }
        b'*' => {
            let size: i64 = str::from_utf8(content)?.parse()?;
            if size == -1 {
                return Ok(Some((RespValue::Array(None), next)));
            }
            let size = usize::try_from(size)
                .map_err(|_| RespError::InvalidFormat("invalid array size".to_string()))?;

            // The header length is untrusted; grow as elements arrive.
            let mut elements = Vec::with_capacity(size.min(MAX_PREALLOCATED_ELEMENTS));
            let mut cursor = next;
            for _ in 0..size {
                match parse(buf, cursor)? {
                    Some((element, after)) => {
                        elements.push(element);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(Some(elements)), cursor)))
        }
        other => Err(RespError::InvalidFormat(format!(
            "unknown RESP type: {}",
            other as char
        ))),
    }
}

/// Find the `\r\n`-terminated line starting at `pos`, returning it without the
/// terminator plus the offset just past it.
fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..end], pos + end + 2))
}
