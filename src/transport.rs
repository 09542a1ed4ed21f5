// HTTP execution primitive used by the dispatcher, plus the reqwest-backed implementation

use crate::error::{RawResponse, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub type Headers = BTreeMap<String, String>;

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        mime_type: Option<String>,
        data: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn file(&self, name: &str) -> Option<(&str, &Bytes)> {
        self.parts.iter().find_map(|part| match part {
            FormPart::File {
                name: n,
                filename,
                data,
                ..
            } if n == name => Some((filename.as_str(), data)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: RequestBody,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub data: Value,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let timeout_ms = request.timeout.as_millis() as u64;
        let is_multipart = matches!(request.body, RequestBody::Multipart(_));

        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            // reqwest writes its own multipart content type carrying the boundary
            if is_multipart && name.eq_ignore_ascii_case(CONTENT_TYPE_HEADER) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart(form) => builder.multipart(into_reqwest_form(form)?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout_ms))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, timeout_ms))?;

        tracing::debug!(url = %request.url, status, bytes = body.len(), "transport response");

        if !(200..300).contains(&status) {
            return Err(TransportError::Status {
                response: RawResponse::new(Some(status), Some(parse_lenient(&body))),
            });
        }

        if body.is_empty() {
            return Ok(TransportResponse {
                status,
                data: Value::Null,
            });
        }

        match serde_json::from_slice(&body) {
            Ok(data) => Ok(TransportResponse { status, data }),
            Err(e) => Err(TransportError::Decode {
                message: e.to_string(),
                response: RawResponse::new(Some(status), Some(parse_lenient(&body))),
            }),
        }
    }
}

fn into_reqwest_form(form: MultipartForm) -> Result<reqwest::multipart::Form, TransportError> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts {
        out = match part {
            FormPart::Text { name, value } => out.text(name, value),
            FormPart::File {
                name,
                filename,
                mime_type,
                data,
            } => {
                let mut file = reqwest::multipart::Part::bytes(data.to_vec()).file_name(filename);
                if let Some(mime_type) = mime_type {
                    file = file
                        .mime_str(&mime_type)
                        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                }
                out.part(name, file)
            }
        };
    }
    Ok(out)
}

fn map_reqwest_error(error: reqwest::Error, timeout_ms: u64) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout_ms)
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

// Error bodies are not always JSON; keep the text when they are not
fn parse_lenient(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

#[cfg(test)]
pub(crate) mod mock_transport {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Scripted transport: replays queued results and records every request
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        requests: Mutex<Vec<TransportRequest>>,
        call_count: AtomicUsize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_ok(&self, data: Value) {
            self.responses
                .lock()
                .push_back(Ok(TransportResponse { status: 200, data }));
        }

        pub fn push_err(&self, error: TransportError) {
            self.responses.lock().push_back(Err(error));
        }

        pub fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().clone()
        }

        pub fn last_request(&self) -> Option<TransportRequest> {
            self.requests.lock().last().cloned()
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Ok(TransportResponse {
                    status: 200,
                    data: Value::Null,
                }))
        }
    }
}
