//! Durable session store speaking the Redis protocol.
//!
//! # Responsibilities
//! - Keep one lazily opened connection, re-opened after any failure
//! - Store links as `{prefix}::{tx}::{query}` with an expiry
//! - Bound every command with a timeout

use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;

use super::resp::{self, RespValue};
use super::{QueryIdentity, Result, SessionError, SessionStore};

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "query-balancer";

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Connection {
    async fn open(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(512),
        })
    }

    async fn round_trip(&mut self, command: &str, args: &[&str]) -> Result<RespValue> {
        let mut out = BytesMut::new();
        resp::encode_command(&mut out, command, args);
        self.stream.write_all(&out).await?;

        loop {
            if let Some(value) = resp::decode(&mut self.buffer)? {
                return match value {
                    RespValue::Error(message) => Err(SessionError::Backend(message)),
                    value => Ok(value),
                };
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "session store closed the connection",
                )
                .into());
            }
        }
    }
}

/// Redis-protocol backed [`SessionStore`] with per-key expiry.
#[derive(Debug)]
pub struct RedisStore {
    address: String,
    prefix: String,
    ttl: Duration,
    timeout: Duration,
    database: u32,
    password: Option<String>,
    connection: Mutex<Option<Connection>>,
}

impl RedisStore {
    pub fn new(address: impl Into<String>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            address: address.into(),
            prefix: prefix.into(),
            ttl,
            timeout: Duration::from_secs(5),
            database: 0,
            password: None,
            connection: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    fn storage_key(&self, query: &QueryIdentity) -> String {
        format!("{}::{}", self.prefix, query.key())
    }

    async fn connect(&self) -> Result<Connection> {
        let mut conn = Connection::open(&self.address).await?;

        if let Some(password) = &self.password {
            conn.round_trip("AUTH", &[password]).await?;
        }
        if self.database != 0 {
            conn.round_trip("SELECT", &[&self.database.to_string()]).await?;
        }

        tracing::debug!(address = %self.address, db = self.database, "Connected to session store");
        Ok(conn)
    }

    async fn execute(&self, command: &str, args: &[&str]) -> Result<RespValue> {
        time::timeout(self.timeout, self.execute_unbounded(command, args))
            .await
            .map_err(|_| {
                SessionError::Backend(format!("{} timed out after {:?}", command, self.timeout))
            })?
    }

    /// The connection is taken out for the round trip and only put back when
    /// the exchange completed, so a failed or abandoned exchange drops it.
    async fn execute_unbounded(&self, command: &str, args: &[&str]) -> Result<RespValue> {
        let mut guard = self.connection.lock().await;

        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        match conn.round_trip(command, args).await {
            Ok(value) => {
                *guard = Some(conn);
                Ok(value)
            }
            Err(e @ SessionError::Backend(_)) => {
                *guard = Some(conn);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn link(&self, query: &QueryIdentity, backend: &str) -> Result<()> {
        let key = self.storage_key(query);
        let ttl_ms = self.ttl.as_millis().to_string();

        match self.execute("SET", &[&key, backend, "PX", &ttl_ms]).await? {
            RespValue::SimpleString(_) => Ok(()),
            other => Err(SessionError::Backend(format!("unexpected SET reply: {:?}", other))),
        }
    }

    async fn unlink(&self, query: &QueryIdentity) -> Result<()> {
        let key = self.storage_key(query);

        match self.execute("DEL", &[&key]).await? {
            RespValue::Integer(_) => Ok(()),
            other => Err(SessionError::Backend(format!("unexpected DEL reply: {:?}", other))),
        }
    }

    async fn get(&self, query: &QueryIdentity) -> Result<String> {
        let key = self.storage_key(query);

        match self.execute("GET", &[&key]).await? {
            RespValue::BulkString(Some(value)) => String::from_utf8(value.to_vec())
                .map_err(|e| SessionError::Backend(format!("stored backend name is not UTF-8: {}", e))),
            RespValue::BulkString(None) => Err(SessionError::LinkNotFound(query.key())),
            other => Err(SessionError::Backend(format!("unexpected GET reply: {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::net::TcpListener;

    type Commands = Arc<StdMutex<Vec<Vec<String>>>>;

    fn reply(data: &StdMutex<HashMap<String, Bytes>>, args: &[String]) -> BytesMut {
        let mut data = data.lock().unwrap();
        let mut out = BytesMut::new();
        match args[0].as_str() {
            "SET" => {
                data.insert(args[1].clone(), Bytes::from(args[2].clone()));
                out.put_slice(b"+OK\r\n");
            }
            "GET" => match data.get(&args[1]) {
                Some(v) => {
                    out.put_slice(format!("${}\r\n", v.len()).as_bytes());
                    out.put_slice(v);
                    out.put_slice(b"\r\n");
                }
                None => out.put_slice(b"$-1\r\n"),
            },
            "DEL" => {
                let n = data.remove(&args[1]).map_or(0, |_| 1);
                out.put_slice(format!(":{}\r\n", n).as_bytes());
            }
            "AUTH" | "SELECT" => out.put_slice(b"+OK\r\n"),
            _ => out.put_slice(b"-ERR unknown command\r\n"),
        }
        out
    }

    /// Tiny in-process server answering SET/GET/DEL/AUTH/SELECT.
    async fn start_fake_store() -> (String, Commands) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let data: Arc<StdMutex<HashMap<String, Bytes>>> = Arc::default();
        let commands: Commands = Arc::default();

        let seen = commands.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let data = data.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let mut buf = BytesMut::new();
                    loop {
                        while let Some(value) = resp::decode(&mut buf).unwrap() {
                            let RespValue::Array(Some(parts)) = value else { panic!("not a command") };
                            let args: Vec<String> = parts
                                .into_iter()
                                .map(|p| match p {
                                    RespValue::BulkString(Some(b)) => String::from_utf8(b.to_vec()).unwrap(),
                                    _ => panic!("not a bulk string"),
                                })
                                .collect();
                            seen.lock().unwrap().push(args.clone());

                            let out = reply(&data, &args);
                            socket.write_all(&out).await.unwrap();
                        }
                        if socket.read_buf(&mut buf).await.unwrap() == 0 {
                            return;
                        }
                    }
                });
            }
        });

        (addr, commands)
    }

    #[tokio::test]
    async fn test_round_trip_with_prefix_and_ttl() {
        let (addr, commands) = start_fake_store().await;
        let store = RedisStore::new(addr, "lb", Duration::from_secs(600))
            .with_database(2)
            .with_password(Some("secret".into()));
        let q = QueryIdentity::new("user", "q-1", None);

        store.link(&q, "c0").await.unwrap();
        assert_eq!(store.get(&q).await.unwrap(), "c0");
        store.unlink(&q).await.unwrap();
        assert!(store.get(&q).await.unwrap_err().is_not_found());

        let commands = commands.lock().unwrap();
        assert_eq!(commands[0], vec!["AUTH", "secret"]);
        assert_eq!(commands[1], vec!["SELECT", "2"]);
        assert_eq!(commands[2], vec!["SET", "lb::NONE::q-1", "c0", "PX", "600000"]);
        assert_eq!(commands[3], vec!["GET", "lb::NONE::q-1"]);
        assert_eq!(commands[4], vec!["DEL", "lb::NONE::q-1"]);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let store = RedisStore::new(addr, DEFAULT_PREFIX, Duration::from_secs(60))
            .with_timeout(Duration::from_millis(500));
        let q = QueryIdentity::new("user", "q-1", None);

        let err = store.get(&q).await.unwrap_err();
        assert!(!err.is_not_found());
    }
}
