// Request dispatch: URL building, auth injection, real or simulated transport,
// multipart uploads and error normalization

use crate::auth::AuthInjector;
use crate::config::ClientConfig;
use crate::error::{normalize_error, NormalizedError, RawResponse, TransportError};
use crate::transport::{
    FormPart, Headers, HttpMethod, MultipartForm, RequestBody, Transport, TransportRequest,
    CONTENT_TYPE_HEADER, MULTIPART_CONTENT_TYPE,
};
use crate::url_builder::{build_url, Params, Query};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// Length of the content hash used as a unique filename prefix
const UNIQUE_PREFIX_LEN: usize = 16;

// Stand-in payload for simulated requests
#[derive(Clone)]
pub enum MockedResponse {
    Static(Value),
    Supplier(Arc<dyn Fn() -> Value + Send + Sync>),
    // Simulates a backend failure whose body is the given value
    Failure(Value),
}

impl MockedResponse {
    pub fn supplier<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        MockedResponse::Supplier(Arc::new(f))
    }

    fn resolve(&self) -> Result<Value, TransportError> {
        match self {
            MockedResponse::Static(value) => Ok(value.clone()),
            MockedResponse::Supplier(supplier) => Ok(supplier()),
            MockedResponse::Failure(body) => Err(TransportError::Status {
                response: RawResponse::new(None, Some(body.clone())),
            }),
        }
    }
}

impl fmt::Debug for MockedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockedResponse::Static(value) => f.debug_tuple("Static").field(value).finish(),
            MockedResponse::Supplier(_) => f.write_str("Supplier(..)"),
            MockedResponse::Failure(value) => f.debug_tuple("Failure").field(value).finish(),
        }
    }
}

#[derive(Clone)]
pub struct ResponseTransform(Arc<dyn Fn(Value) -> Value + Send + Sync>);

impl ResponseTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    fn apply(&self, value: Value) -> Value {
        (self.0)(value)
    }
}

impl fmt::Debug for ResponseTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseTransform(..)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub field_name: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
    // Replaces the file's own extension when set
    pub extension: Option<String>,
    // Prefix the file name with a hash of its contents
    pub unique_name: bool,
}

impl Upload {
    pub fn new(field_name: &str, file_name: &str, data: impl Into<Bytes>) -> Self {
        Self {
            field_name: field_name.to_string(),
            file_name: file_name.to_string(),
            mime_type: None,
            data: data.into(),
            extension: None,
            unique_name: false,
        }
    }

    pub fn mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    pub fn extension(mut self, extension: &str) -> Self {
        self.extension = Some(extension.to_string());
        self
    }

    pub fn unique_name(mut self) -> Self {
        self.unique_name = true;
        self
    }

    pub fn outgoing_file_name(&self) -> String {
        let base = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();

        let named = match self.extension.as_deref() {
            Some(ext) => {
                let stem = match base.rfind('.') {
                    Some(dot) if dot > 0 => &base[..dot],
                    _ => base,
                };
                format!("{}.{}", stem, ext.trim_start_matches('.'))
            }
            None => base.to_string(),
        };

        if self.unique_name {
            let digest = hex::encode(Sha256::digest(&self.data));
            format!("{}-{}", &digest[..UNIQUE_PREFIX_LEN], named)
        } else {
            named
        }
    }
}

// Everything needed for one dispatch call. Built fresh by each caller.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub base_url: Option<String>,
    pub endpoint: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
    pub headers: Headers,
    pub query: Option<Query>,
    pub params: Option<Params>,
    pub extra_query_prefix: Option<String>,
    pub timeout: Option<Duration>,
    pub simulate: bool,
    pub mocked_response: Option<MockedResponse>,
    pub upload: Option<Upload>,
    pub response_transform: Option<ResponseTransform>,
    pub custom_error_message: Option<String>,
    pub error_code_first: bool,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, endpoint: &str) -> Self {
        Self {
            method,
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    pub fn get(endpoint: &str) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: &str) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn put(endpoint: &str) -> Self {
        Self::new(HttpMethod::Put, endpoint)
    }

    pub fn delete(endpoint: &str) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(Params::new)
            .insert(name.to_string(), value.into());
        self
    }

    pub fn extra_query_prefix(mut self, prefix: &str) -> Self {
        self.extra_query_prefix = Some(prefix.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn simulated(mut self, mocked: MockedResponse) -> Self {
        self.simulate = true;
        self.mocked_response = Some(mocked);
        self
    }

    pub fn upload(mut self, upload: Upload) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.response_transform = Some(ResponseTransform::new(f));
        self
    }

    pub fn error_message(mut self, message: &str) -> Self {
        self.custom_error_message = Some(message.to_string());
        self
    }

    pub fn error_code_first(mut self) -> Self {
        self.error_code_first = true;
        self
    }
}

// Executes request descriptors. Holds no per-call state, so concurrent
// dispatches of identical descriptors each make their own round trip.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    auth: Arc<AuthInjector>,
    base_url: String,
    default_timeout: Duration,
    simulated_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<AuthInjector>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            transport,
            auth,
            base_url: config.base_url.clone(),
            default_timeout: config.timeout(),
            simulated_delay: config.simulated_delay(),
        }
    }

    pub async fn dispatch(&self, descriptor: RequestDescriptor) -> Result<Value, NormalizedError> {
        let result = if descriptor.simulate {
            self.simulate(&descriptor).await
        } else {
            self.execute(&descriptor).await
        };

        match result {
            Ok(payload) => Ok(match &descriptor.response_transform {
                Some(transform) => transform.apply(payload),
                None => payload,
            }),
            Err(error) => Err(normalize_error(
                &error,
                descriptor.custom_error_message.as_deref(),
                descriptor.error_code_first,
            )),
        }
    }

    // Dispatches and decodes the final payload into `T`
    pub async fn dispatch_as<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, NormalizedError> {
        let custom_message = descriptor.custom_error_message.clone();
        let error_code_first = descriptor.error_code_first;
        let payload = self.dispatch(descriptor).await?;

        serde_json::from_value(payload.clone()).map_err(|e| {
            let error = TransportError::Decode {
                message: e.to_string(),
                response: RawResponse::new(None, Some(payload)),
            };
            normalize_error(&error, custom_message.as_deref(), error_code_first)
        })
    }

    async fn simulate(&self, descriptor: &RequestDescriptor) -> Result<Value, TransportError> {
        let mocked = descriptor
            .mocked_response
            .as_ref()
            .ok_or(TransportError::MissingMock)?;
        let value = mocked.resolve();

        tracing::debug!(endpoint = %descriptor.endpoint, "simulating request");
        tokio::time::sleep(self.simulated_delay).await;
        value
    }

    async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Value, TransportError> {
        let url = build_url(
            descriptor.base_url.as_deref().unwrap_or(&self.base_url),
            &descriptor.endpoint,
            descriptor.params.as_ref(),
            descriptor.query.as_ref(),
            descriptor.extra_query_prefix.as_deref(),
        );

        let mut headers = descriptor.headers.clone();
        let body = match &descriptor.upload {
            Some(upload) => {
                headers.insert(
                    CONTENT_TYPE_HEADER.to_string(),
                    MULTIPART_CONTENT_TYPE.to_string(),
                );
                RequestBody::Multipart(build_multipart(upload, descriptor.body.as_ref())?)
            }
            None => match &descriptor.body {
                Some(body) => RequestBody::Json(body.clone()),
                None => RequestBody::Empty,
            },
        };
        let headers = self.auth.inject(headers, &descriptor.endpoint).await;

        tracing::debug!(method = ?descriptor.method, %url, "dispatching request");

        let response = self
            .transport
            .execute(TransportRequest {
                method: descriptor.method,
                url,
                headers,
                body,
                timeout: descriptor.timeout.unwrap_or(self.default_timeout),
            })
            .await?;
        Ok(response.data)
    }
}

fn build_multipart(upload: &Upload, body: Option<&Value>) -> Result<MultipartForm, TransportError> {
    if upload.field_name.is_empty() {
        return Err(TransportError::InvalidRequest(
            "upload field name is empty".to_string(),
        ));
    }

    let filename = upload.outgoing_file_name();
    let mut parts = vec![
        FormPart::File {
            name: upload.field_name.clone(),
            filename: filename.clone(),
            mime_type: upload.mime_type.clone(),
            data: upload.data.clone(),
        },
        FormPart::Text {
            name: "Name".to_string(),
            value: filename,
        },
    ];

    match body {
        None | Some(Value::Null) => {}
        Some(Value::Object(fields)) => {
            for (name, value) in fields {
                let value = match value {
                    Value::Null => continue,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                parts.push(FormPart::Text {
                    name: name.clone(),
                    value,
                });
            }
        }
        Some(_) => {
            return Err(TransportError::InvalidRequest(
                "upload body must be an object".to_string(),
            ))
        }
    }

    Ok(MultipartForm { parts })
}
