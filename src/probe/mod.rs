use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

mod parsing;

use parsing::{parse_status_line, status_request, Parse};

const MAX_STATUS_LINE: usize = 8 * 1024;

/// How long to keep knocking on the debugger port before giving up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub attempts: usize,
    /// Delays grow as `2^n * backoff_factor_ms`, with jitter.
    pub backoff_factor_ms: u64,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 30,
            backoff_factor_ms: 50,
            max_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor(self.backoff_factor_ms)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.attempts.saturating_sub(1))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("no status line within {0:?}")]
    Timeout(Duration),
    #[error("connection closed before a status line arrived")]
    Closed,
    #[error("response did not start with an http status line")]
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("debugger server at {addr} not reachable after {attempts} attempts")]
    Unreachable {
        addr: SocketAddr,
        attempts: usize,
        #[source]
        last: AttemptError,
    },
}

async fn probe_once(addr: SocketAddr) -> Result<u16, AttemptError> {
    let mut socket = TcpStream::connect(addr).await?;
    socket.write_all(status_request(addr).as_bytes()).await?;

    let mut buffer = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];

    loop {
        let read = socket.read(&mut chunk).await?;

        if read == 0 {
            return Err(AttemptError::Closed);
        }

        buffer.extend_from_slice(&chunk[..read]);

        match parse_status_line(&buffer) {
            Parse::Done(line) => {
                tracing::debug!(version = ?line.version, code = line.code, reason = line.reason, "got status line");
                return Ok(line.code);
            }
            Parse::Invalid => return Err(AttemptError::Malformed),
            Parse::MoreData if buffer.len() > MAX_STATUS_LINE => {
                return Err(AttemptError::Malformed)
            }
            Parse::MoreData => {}
        }
    }
}

/// Waits until something at `addr` answers an HTTP request, returning the status code.
///
/// Any status counts, the debugger server answers `/` with a 404.
#[tracing::instrument(skip(policy))]
pub async fn wait_until_listening(addr: SocketAddr, policy: &RetryPolicy) -> Result<u16, ProbeError> {
    let attempt_timeout = policy.attempt_timeout;

    let result = Retry::spawn(policy.delays(), || async move {
        let outcome = match timeout(attempt_timeout, probe_once(addr)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AttemptError::Timeout(attempt_timeout)),
        };

        if let Err(error) = &outcome {
            tracing::debug!(%error, "debugger server not ready yet");
        }

        outcome
    })
    .await;

    match result {
        Ok(code) => {
            tracing::info!(code, "debugger server is answering");
            Ok(code)
        }
        Err(last) => Err(ProbeError::Unreachable {
            addr,
            attempts: policy.attempts.max(1),
            last,
        }),
    }
}

/// Serves a single canned HTTP status line to every connection.
#[cfg(test)]
pub(crate) async fn spawn_http_stub(status_line: &'static str) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(status_line.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

#[cfg(test)]
mod test {
    use tokio::net::TcpListener;

    use super::*;

    fn quick(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff_factor_ms: 1,
            max_delay: Duration::from_millis(20),
            attempt_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn returns_the_status_of_a_listening_server() {
        let addr = spawn_http_stub("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n").await;

        let code = wait_until_listening(addr, &quick(3)).await.unwrap();

        assert_eq!(code, 404);
    }

    #[tokio::test]
    async fn reassembles_a_split_status_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket.write_all(b"HTTP/1.").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(b"1 200 OK\r\n\r\n").await.unwrap();
            let _ = socket.shutdown().await;
        });

        let code = wait_until_listening(addr, &quick(1)).await.unwrap();

        assert_eq!(code, 200);
    }

    #[tokio::test]
    async fn gives_up_on_a_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = wait_until_listening(addr, &quick(2)).await.unwrap_err();

        let ProbeError::Unreachable { addr: reported, attempts, last } = err;
        assert_eq!(reported, addr);
        assert_eq!(attempts, 2);
        assert!(matches!(last, AttemptError::Io(_)), "{last:?}");
    }

    #[tokio::test]
    async fn treats_a_non_http_peer_as_not_ready() {
        let addr = spawn_http_stub("SSH-2.0-OpenSSH_9.6\r\n").await;

        let err = wait_until_listening(addr, &quick(2)).await.unwrap_err();

        let ProbeError::Unreachable { last, .. } = err;
        assert!(matches!(last, AttemptError::Malformed), "{last:?}");
    }
}
