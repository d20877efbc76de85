use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use std::time::Instant;

/// What the admission step decided for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Preflight,
    Admitted,
    Denied { retry_after_secs: u64 },
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Admitted => "admitted",
            Self::Denied { .. } => "denied",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Transport peer address exactly as the listener reported it.
    pub remote_addr: String,
    pub started_at: Instant,
    pub client_key: Option<String>,
    pub admission: Option<Admission>,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: String,
    ) -> Self {
        Self {
            request_id,
            method,
            uri,
            headers,
            body,
            remote_addr,
            started_at: Instant::now(),
            client_key: None,
            admission: None,
        }
    }
}
