//! Event-style function invocation over HTTP

use std::time::Duration;

use async_trait::async_trait;
use pbench_core::config::InvocationEvent;
use pbench_core::error::{BenchError, BenchResult};
use pbench_core::traits::{LaunchHandle, WorkerLauncher};
use pbench_core::worker::WorkerOutcome;
use reqwest::Client;

/// Header asking the function service to queue the invocation and answer
/// right away instead of waiting for the function to return
pub const INVOCATION_TYPE_HEADER: &str = "X-Amz-Invocation-Type";

/// HTTP settings for function invocation
#[derive(Debug, Clone)]
pub struct HttpInvokeConfig {
    /// Request timeout
    pub request_timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Bearer token sent with every invocation
    pub bearer_token: Option<String>,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpInvokeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 32,
            bearer_token: None,
            user_agent: format!("pbench/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpInvokeConfig {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// Launches each worker by POSTing its invocation event as JSON
///
/// The handle resolves with [`WorkerOutcome::Dispatched`] once the service
/// accepted the request; how the worker fares is only visible on the log
/// channel.
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    client: Client,
    url: String,
    config: HttpInvokeConfig,
}

impl HttpLauncher {
    /// Create a launcher for the function at `url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, config: HttpInvokeConfig) -> BenchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| BenchError::config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            config,
        })
    }

    /// Function endpoint
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WorkerLauncher for HttpLauncher {
    fn name(&self) -> &str {
        "http"
    }

    async fn launch(&self, event: InvocationEvent) -> BenchResult<LaunchHandle> {
        let worker = event.worker_id;

        let mut request = self
            .client
            .post(&self.url)
            .header(INVOCATION_TYPE_HEADER, "Event")
            .json(&event);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let task = tokio::spawn(async move {
            let response = request
                .send()
                .await
                .map_err(|e| BenchError::invocation(worker, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BenchError::invocation(
                    worker,
                    format!("function returned {status}: {}", body.trim()),
                ));
            }

            tracing::debug!(worker_id = %worker, %status, "Invocation accepted");
            Ok(WorkerOutcome::Dispatched)
        });

        Ok(LaunchHandle::new(worker, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbench_core::config::RunConfig;
    use pbench_core::protocol::WorkerId;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    struct Captured {
        head: String,
        body: String,
    }

    /// Answers one HTTP request with `status_line` and returns what it got
    async fn responder(status_line: &'static str) -> (String, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/invoke", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];

            let (head, body_start) = loop {
                let n = stream.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break (String::from_utf8_lossy(&raw[..pos]).to_string(), pos + 4);
                }
            };

            let length = head
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while raw.len() < body_start + length {
                let n = stream.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).await.unwrap();

            Captured {
                head,
                body: String::from_utf8_lossy(&raw[body_start..body_start + length]).to_string(),
            }
        });

        (url, handle)
    }

    fn event() -> InvocationEvent {
        RunConfig::new("10.0.0.5", 8888).invocation_event(WorkerId(4), "job-2", 8888, 8889)
    }

    #[tokio::test]
    async fn test_launch_posts_event() {
        let (url, server) = responder("HTTP/1.1 202 Accepted").await;
        let launcher = HttpLauncher::new(
            url,
            HttpInvokeConfig::default().with_bearer_token("secret"),
        )
        .unwrap();

        let handle = launcher.launch(event()).await.unwrap();
        assert_eq!(handle.worker(), WorkerId(4));
        let outcome = handle.join().await.unwrap();
        assert!(matches!(outcome, WorkerOutcome::Dispatched));

        let captured = server.await.unwrap();
        let head = captured.head.to_ascii_lowercase();
        assert!(head.starts_with("post /invoke"));
        assert!(head.contains("x-amz-invocation-type: event"));
        assert!(head.contains("authorization: bearer secret"));

        let sent: InvocationEvent = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(sent, event());
    }

    #[tokio::test]
    async fn test_rejected_invocation_is_an_error() {
        let (url, _server) = responder("HTTP/1.1 500 Internal Server Error").await;
        let launcher = HttpLauncher::new(url, HttpInvokeConfig::default()).unwrap();

        let err = launcher
            .launch(event())
            .await
            .unwrap()
            .join()
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Invocation { worker: WorkerId(4), .. }));
    }
}
