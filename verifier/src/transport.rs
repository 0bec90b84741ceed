// Copyright (c) 2023 The MobileCoin Foundation

//! Blocking HTTP access for revocation, timestamp and trust-list clients.
//!
//! Every call is bounded by the transport's own timeout and by the
//! [`Deadline`] of the validation run, whichever is sooner. A timeout is
//! reported like any other fetch failure.

use crate::time::Deadline;
use core::fmt::Debug;
use core::time::Duration;
use std::io::Read;
use tracing::debug;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default limit on the size of a response body
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Error fetching a resource
#[derive(Debug, displaydoc::Display, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Timed out waiting for {0}
    Timeout(String),
    /// The validation deadline passed before {0} could be fetched
    DeadlineExceeded(String),
    /// {url} answered with HTTP status {status}
    #[allow(missing_docs)]
    Status { url: String, status: u16 },
    /// Network error: {0}
    Network(String),
    /// Unsupported URL scheme in {0}
    UnsupportedScheme(String),
    /// The response from {url} is larger than {limit} bytes
    #[allow(missing_docs)]
    TooLarge { url: String, limit: u64 },
}

impl std::error::Error for TransportError {}

/// Fetches bytes over the network
pub trait Transport: Debug + Send + Sync {
    /// `GET` `url`
    fn get(&self, url: &str, deadline: &Deadline) -> Result<Vec<u8>, TransportError>;

    /// `POST` `body` to `url`
    fn post(
        &self,
        url: &str,
        content_type: &'static str,
        accept: &'static str,
        body: &[u8],
        deadline: &Deadline,
    ) -> Result<Vec<u8>, TransportError>;
}

/// [`Transport`] over `reqwest`'s blocking client
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
    max_response_bytes: u64,
}

impl HttpTransport {
    /// Create a transport with a per-request `timeout` and a limit on the
    /// response size
    pub fn new(timeout: Duration, max_response_bytes: u64) -> crate::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("sigtrust-verifier/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            max_response_bytes,
        })
    }

    fn send(
        &self,
        url: &str,
        request: reqwest::blocking::RequestBuilder,
        deadline: &Deadline,
    ) -> Result<Vec<u8>, TransportError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TransportError::UnsupportedScheme(url.into()));
        }
        let timeout = deadline
            .bound(self.timeout)
            .ok_or_else(|| TransportError::DeadlineExceeded(url.into()))?;

        debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "fetching");
        let response = request
            .timeout(timeout)
            .send()
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.into(),
                status: status.as_u16(),
            });
        }

        let mut body = Vec::new();
        response
            .take(self.max_response_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    TransportError::Timeout(url.into())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;
        if body.len() as u64 > self.max_response_bytes {
            return Err(TransportError::TooLarge {
                url: url.into(),
                limit: self.max_response_bytes,
            });
        }
        debug!(url = %url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

fn classify(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(url.into())
    } else {
        TransportError::Network(error.to_string())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, deadline: &Deadline) -> Result<Vec<u8>, TransportError> {
        self.send(url, self.client.get(url), deadline)
    }

    fn post(
        &self,
        url: &str,
        content_type: &'static str,
        accept: &'static str,
        body: &[u8],
        deadline: &Deadline,
    ) -> Result<Vec<u8>, TransportError> {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::ACCEPT, accept)
            .body(body.to_vec());
        self.send(url, request, deadline)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use std::net::TcpListener;

    /// Serve one connection on localhost, answering with `response` unless
    /// `stall` is set, in which case the connection is held open silently.
    fn serve_once(response: &'static [u8], stall: Option<Duration>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        let address = listener.local_addr().expect("Missing address");
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                match stall {
                    Some(duration) => std::thread::sleep(duration),
                    None => {
                        let _ = stream.write_all(response);
                    }
                }
            }
        });
        format!("http://{address}/resource")
    }

    fn transport(timeout: Duration, limit: u64) -> HttpTransport {
        HttpTransport::new(timeout, limit).expect("Failed to create transport")
    }

    #[test]
    fn get_returns_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            None,
        );
        let body = transport(DEFAULT_TIMEOUT, 1024)
            .get(&url, &Deadline::none())
            .expect("Failed to fetch");
        assert_eq!(body, b"hello");
    }

    #[test]
    fn error_status_is_reported() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            None,
        );
        assert_eq!(
            transport(DEFAULT_TIMEOUT, 1024).get(&url, &Deadline::none()),
            Err(TransportError::Status { url, status: 404 })
        );
    }

    #[test]
    fn oversized_body_is_rejected() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            None,
        );
        assert_eq!(
            transport(DEFAULT_TIMEOUT, 4).get(&url, &Deadline::none()),
            Err(TransportError::TooLarge { url, limit: 4 })
        );
    }

    #[test]
    fn unbounded_limit_returns_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            None,
        );
        let body = transport(DEFAULT_TIMEOUT, u64::MAX)
            .get(&url, &Deadline::none())
            .expect("Failed to fetch");
        assert_eq!(body, b"hello");
    }

    #[test]
    fn silent_server_times_out() {
        let url = serve_once(b"", Some(Duration::from_secs(3)));
        assert_eq!(
            transport(Duration::from_millis(200), 1024).get(&url, &Deadline::none()),
            Err(TransportError::Timeout(url))
        );
    }

    #[test]
    fn expired_deadline_skips_the_request() {
        let deadline = Deadline::after(Duration::ZERO);
        assert_matches!(
            transport(DEFAULT_TIMEOUT, 1024).get("http://127.0.0.1:9/never", &deadline),
            Err(TransportError::DeadlineExceeded(_))
        );
    }

    #[test]
    fn ldap_is_not_supported() {
        assert_matches!(
            transport(DEFAULT_TIMEOUT, 1024).get(
                "ldap://directory.example/cn=CA?certificateRevocationList",
                &Deadline::none()
            ),
            Err(TransportError::UnsupportedScheme(_))
        );
    }
}
