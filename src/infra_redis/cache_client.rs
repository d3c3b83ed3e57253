use super::redis_cache::{RedisCache, is_auth_rejection};
use crate::domain_port::*;
use crate::logger::*;
use redis::aio::ConnectionManagerConfig;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DEFAULT_PORT: u16 = 6379;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for a single attempt, handshake included.
    pub connect_timeout: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl BackoffConfig {
    /// Delays slept between consecutive connection attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        std::iter::successors(Some(self.initial_backoff.min(self.max_backoff)), |d| {
            Some((*d * 2).min(self.max_backoff))
        })
        .take(retries)
    }
}

/// Process-wide connection to the cache. `connect` hands out a shared
/// `CacheHandle`.
///
/// The backoff here is the only retry policy at connect time: the connection
/// manager is built without internal retries, so `max_attempts` is exact and
/// a rejected password surfaces on the first attempt. After the first
/// successful connect the manager re-dials lazily when a command finds the
/// connection broken.
pub struct CacheClient {
    backoff: BackoffConfig,
    handle: tokio::sync::Mutex<Option<CacheHandle>>,
    state: Mutex<ConnectionState>,
    closed: Arc<AtomicBool>,
}

impl CacheClient {
    pub fn new(backoff: BackoffConfig) -> Self {
        CacheClient {
            backoff,
            handle: tokio::sync::Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Connects once; later calls return the existing handle. Transient
    /// failures are retried with capped exponential backoff, rejected
    /// credentials are reported immediately.
    pub async fn connect(
        &self,
        address: &str,
        password: Option<&str>,
        database: i64,
    ) -> Result<CacheHandle, CacheError> {
        let mut slot = self.handle.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let info = connection_info(address, password, database)?;
        let client =
            redis::Client::open(info).map_err(|e| CacheError::InvalidAddress(e.to_string()))?;

        self.set_state(ConnectionState::Connecting);
        let mut delays = self.backoff.delays();
        let mut attempt = 1;
        loop {
            let manager_config = ConnectionManagerConfig::new().set_number_of_retries(0);
            let dial = tokio::time::timeout(
                self.backoff.connect_timeout,
                client.get_connection_manager_with_config(manager_config),
            );
            let failure = match dial.await {
                Ok(Ok(conn)) => {
                    let handle: CacheHandle =
                        Arc::new(RedisCache::new(conn, self.closed.clone()));
                    *slot = Some(handle.clone());
                    self.set_state(ConnectionState::Connected);
                    info!(address, database, attempt, "cache connected");
                    return Ok(handle);
                }
                Ok(Err(e)) if is_auth_rejection(&e) => {
                    self.set_state(ConnectionState::Disconnected);
                    error!(address, error = %e, "cache rejected credentials");
                    return Err(CacheError::AuthRejected(e.to_string()));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "no connection within {}ms",
                    self.backoff.connect_timeout.as_millis()
                ),
            };

            match delays.next() {
                Some(delay) => {
                    warn!(
                        address,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %failure,
                        "cache connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    self.set_state(ConnectionState::Disconnected);
                    error!(address, attempt, error = %failure, "cache connect failed, giving up");
                    return Err(CacheError::Unavailable(failure));
                }
            }
        }
    }

    /// Handles already given out start failing with `CacheError::Closed`.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.handle.lock().await.take();
        self.set_state(ConnectionState::Closed);
        info!("cache client closed");
    }
}

/// Connection parameters for `host[:port]` (an optional `redis://` prefix is
/// accepted, IPv6 hosts go in brackets). The password is carried as is, it
/// never passes through URL parsing.
pub fn connection_info(
    address: &str,
    password: Option<&str>,
    database: i64,
) -> Result<ConnectionInfo, CacheError> {
    let address = address.trim();
    let address = address.strip_prefix("redis://").unwrap_or(address);
    if address.is_empty() {
        return Err(CacheError::InvalidAddress("address is empty".to_string()));
    }
    if database < 0 {
        return Err(CacheError::InvalidAddress(format!(
            "database index must not be negative: {}",
            database
        )));
    }
    let (host, port) = split_host_port(address)?;

    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: RedisConnectionInfo {
            db: database,
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            ..RedisConnectionInfo::default()
        },
    })
}

fn split_host_port(address: &str) -> Result<(String, u16), CacheError> {
    let invalid = || CacheError::InvalidAddress(format!("expected host:port, got {:?}", address));

    let (host, port) = match address.strip_prefix('[') {
        Some(bracketed) => {
            let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
            match rest {
                "" => (host, None),
                _ => (host, Some(rest.strip_prefix(':').ok_or_else(invalid)?)),
            }
        }
        None => match address.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        },
    };
    let bracketed = address.starts_with('[');
    if host.is_empty() || (!bracketed && host.contains(['/', '@', ':'])) {
        return Err(invalid());
    }
    let port = match port {
        Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
        None => DEFAULT_PORT,
    };
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    const WRONGPASS: &str =
        "-WRONGPASS invalid username-password pair or user is disabled.\r\n";

    fn quick_backoff(max_attempts: u32) -> BackoffConfig {
        BackoffConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            connect_timeout: Duration::from_secs(1),
        }
    }

    /// Local server answering every RESP command it receives with `reply`.
    /// Returns its address and a counter of accepted connections.
    async fn scripted_server(reply: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    loop {
                        let n = match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        let commands = buf[..n]
                            .split(|b| *b == b'\n')
                            .filter(|line| line.first() == Some(&b'*'))
                            .count();
                        for _ in 0..commands.max(1) {
                            if socket.write_all(reply.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });
        (address, accepted)
    }

    /// Local server that hangs up on every connection right after accepting.
    async fn hangup_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });
        (address, accepted)
    }

    #[test]
    fn connection_info_keeps_password_verbatim() {
        let info = connection_info("cache:6379", Some("pa/ss#wo?rd%40@"), 2).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("cache".to_string(), 6379));
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password.as_deref(), Some("pa/ss#wo?rd%40@"));
        assert!(redis::Client::open(info).is_ok());
    }

    #[test]
    fn connection_info_address_forms() {
        let info = connection_info("redis://127.0.0.1:6380", Some(""), 0).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("127.0.0.1".to_string(), 6380));
        assert!(info.redis.password.is_none());

        let info = connection_info("cache", None, 0).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("cache".to_string(), DEFAULT_PORT));

        let info = connection_info("[::1]:7000", None, 0).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("::1".to_string(), 7000));
    }

    #[test]
    fn bad_addresses_are_rejected() {
        for address in ["  ", "redis://", "cache:port", "cache:6379/0", ":6379", "[::1"] {
            assert!(
                matches!(
                    connection_info(address, None, 0),
                    Err(CacheError::InvalidAddress(_))
                ),
                "{:?} should be rejected",
                address
            );
        }
        assert!(matches!(
            connection_info("cache:6379", None, -1),
            Err(CacheError::InvalidAddress(_))
        ));
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let backoff = BackoffConfig {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            ..BackoffConfig::default()
        };
        let delays: Vec<u64> = backoff.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        let backoff = BackoffConfig {
            max_attempts: 1,
            ..BackoffConfig::default()
        };
        assert_eq!(backoff.delays().count(), 0);
    }

    #[tokio::test]
    async fn connect_without_address_fails_before_any_network_io() {
        let client = CacheClient::new(BackoffConfig::default());
        let err = client.connect("", None, 0).await.err();
        assert!(matches!(err, Some(CacheError::InvalidAddress(_))));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn rejected_credentials_fail_on_the_first_attempt() {
        let (address, accepted) = scripted_server(WRONGPASS).await;
        let client = CacheClient::new(quick_backoff(5));

        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client.connect(&address, Some("bad"), 0),
        )
        .await
        .expect("connect with a rejected password must not hang");

        assert!(matches!(result, Err(CacheError::AuthRejected(_))));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn transient_failures_use_exactly_max_attempts() {
        let (address, accepted) = hangup_server().await;
        let client = CacheClient::new(quick_backoff(3));

        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client.connect(&address, Some("pw"), 0),
        )
        .await
        .expect("bounded retry must give up");

        assert!(matches!(result, Err(CacheError::Unavailable(_))));
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn single_attempt_against_refused_port_returns_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = CacheClient::new(quick_backoff(1));
        let started = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(10), client.connect(&address, None, 0))
            .await
            .expect("a single refused attempt must not hang");

        assert!(matches!(result, Err(CacheError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn second_connect_reuses_the_handle() {
        let (address, accepted) = scripted_server("+OK\r\n").await;
        let client = CacheClient::new(quick_backoff(3));

        let first = client.connect(&address, Some("s3cret"), 0).await.unwrap();
        let second = client.connect(&address, Some("s3cret"), 0).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ConnectionState::Connected);

        client.close().await;
        assert_eq!(first.get("k").await, Err(CacheError::Closed));
    }

    #[tokio::test]
    async fn close_is_terminal_and_idempotent() {
        let client = CacheClient::new(BackoffConfig::default());
        client.close().await;
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        let err = client.connect("127.0.0.1:6379", None, 0).await.err();
        assert_eq!(err, Some(CacheError::Closed));
    }
}
