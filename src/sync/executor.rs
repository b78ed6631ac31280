//! Executors that turn queued operations back into network effects.
//!
//! Operations carry only a `kind` and a payload. At drain time the queue
//! looks the kind up in an [`ExecutorRegistry`] and hands the operation to
//! the registered [`OperationExecutor`].

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::operation::{Command, QueuedOperation};
use crate::error::OffsyncError;

/// Runs one kind of queued operation.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Execute `operation`. Any error counts as a failed attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation did not take effect.
    async fn execute(&self, operation: &QueuedOperation) -> Result<(), OffsyncError>;
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> OperationExecutor for FnExecutor<F>
where
    F: Fn(QueuedOperation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), OffsyncError>> + Send + 'static,
{
    async fn execute(&self, operation: &QueuedOperation) -> Result<(), OffsyncError> {
        (self.0)(operation.clone()).await
    }
}

/// Maps operation kinds to their executors.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn OperationExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor` for `kind`, replacing any previous one.
    pub fn register<E>(&mut self, kind: impl Into<String>, executor: E) -> &mut Self
    where
        E: OperationExecutor + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "executor registered");
        self.executors.insert(kind, Arc::new(executor));
        self
    }

    /// Register an async closure for `kind`.
    pub fn register_fn<F, Fut>(&mut self, kind: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(QueuedOperation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OffsyncError>> + Send + 'static,
    {
        self.register(kind, FnExecutor(handler))
    }

    /// Register a handler for a typed [`Command`].
    ///
    /// A payload that does not decode into `C` fails the attempt.
    pub fn register_command<C, F, Fut>(&mut self, handler: F) -> &mut Self
    where
        C: Command,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OffsyncError>> + Send + 'static,
    {
        self.register_fn(C::KIND, move |operation: QueuedOperation| {
            let pending = operation
                .decode::<C>()
                .map_err(|e| {
                    OffsyncError::execution(format!("Invalid {} payload: {e}", C::KIND))
                })
                .map(&handler);
            async move { pending?.await }
        })
    }

    /// The executor for `kind`, if any.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn OperationExecutor>> {
        self.executors.get(kind).cloned()
    }

    /// Whether an executor is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.executors.contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Payload for a deferred HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,
    /// Target URL
    pub url: String,
    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl HttpRequest {
    /// A request with no headers and no body.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

impl Command for HttpRequest {
    const KIND: &'static str = "http";
}

/// Executes [`HttpRequest`] operations with reqwest.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Create an executor whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, OffsyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("offsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OffsyncError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Perform one request.
    ///
    /// # Errors
    ///
    /// Returns an execution error for an invalid method, a transport failure
    /// or a non-2xx response.
    pub async fn send(&self, request: &HttpRequest) -> Result<(), OffsyncError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| {
                OffsyncError::execution(format!("Invalid HTTP method: {}", request.method))
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OffsyncError::execution(format!("Request to {} failed: {e}", request.url)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(OffsyncError::execution(format!(
                "{} {} returned {status}",
                request.method.to_uppercase(),
                request.url
            )))
        }
    }
}

#[async_trait]
impl OperationExecutor for HttpExecutor {
    async fn execute(&self, operation: &QueuedOperation) -> Result<(), OffsyncError> {
        let request: HttpRequest = operation
            .decode()
            .map_err(|e| OffsyncError::execution(format!("Invalid http payload: {e}")))?;
        self.send(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn operation(kind: &str, payload: serde_json::Value) -> QueuedOperation {
        QueuedOperation {
            id: 1,
            kind: kind.to_string(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_attempt: None,
            last_error: None,
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Bookmark {
        surah: u32,
    }

    impl Command for Bookmark {
        const KIND: &'static str = "bookmark";
    }

    /// Serve one HTTP request with `status` and return the raw request text.
    async fn serve_once(status: u16) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/sync", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response =
                format!("HTTP/1.1 {status} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });

        (url, server)
    }

    #[tokio::test]
    async fn test_register_fn_runs_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut registry = ExecutorRegistry::new();
        registry.register_fn("note", move |op| {
            sink.lock().unwrap().push(op.id);
            async { Ok(()) }
        });

        let executor = registry.get("note").unwrap();
        executor.execute(&operation("note", json!(null))).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_register_command_decodes_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut registry = ExecutorRegistry::new();
        registry.register_command(move |cmd: Bookmark| {
            sink.lock().unwrap().push(cmd.surah);
            async { Ok(()) }
        });

        let executor = registry.get(Bookmark::KIND).unwrap();
        executor
            .execute(&operation(Bookmark::KIND, json!({"surah": 36})))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![36]);

        let err = executor
            .execute(&operation(Bookmark::KIND, json!({"page": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, OffsyncError::Execution(_)));
    }

    #[test]
    fn test_kinds_and_contains() {
        let mut registry = ExecutorRegistry::new();
        registry
            .register_fn("b", |_| async { Ok(()) })
            .register_fn("a", |_| async { Ok(()) });

        assert_eq!(registry.kinds(), vec!["a", "b"]);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_http_request_defaults() {
        let req: HttpRequest = serde_json::from_value(json!({"url": "http://x"})).unwrap();
        assert_eq!(req.method, "POST");
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn test_http_executor_success() {
        let (url, server) = serve_once(204).await;
        let executor = HttpExecutor::new(Duration::from_secs(5)).unwrap();

        let mut request = HttpRequest::new("put", &url);
        request
            .headers
            .insert("x-client".to_string(), "offsync-test".to_string());
        request.body = Some(json!({"read": true}));

        executor
            .execute(&operation("http", serde_json::to_value(&request).unwrap()))
            .await
            .unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("PUT /sync"));
        assert!(raw.to_ascii_lowercase().contains("x-client: offsync-test"));
        assert!(raw.contains(r#"{"read":true}"#));
    }

    #[tokio::test]
    async fn test_http_executor_non_success_status_fails() {
        let (url, server) = serve_once(503).await;
        let executor = HttpExecutor::new(Duration::from_secs(5)).unwrap();

        let err = executor
            .send(&HttpRequest::new("POST", &url))
            .await
            .unwrap_err();
        assert!(matches!(err, OffsyncError::Execution(ref m) if m.contains("503")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_executor_invalid_method() {
        let executor = HttpExecutor::new(Duration::from_secs(1)).unwrap();
        let err = executor
            .send(&HttpRequest::new("NOT A METHOD", "http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(matches!(err, OffsyncError::Execution(_)));
    }

    #[tokio::test]
    async fn test_http_executor_bad_payload() {
        let executor = HttpExecutor::new(Duration::from_secs(1)).unwrap();
        let err = executor
            .execute(&operation("http", json!({"method": "GET"})))
            .await
            .unwrap_err();
        assert!(matches!(err, OffsyncError::Execution(_)));
    }
}
