// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP transport capability and GET/POST selection.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};
use ropc_protocol::CONTENT_TYPE;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::codec::{CodecError, Payload};
use crate::config::ClientConfig;
use crate::encoder::{BoundParameter, encode_to_bytes};
use crate::error::{ClientError, Result};
use crate::types::QueryPart;

/// Longest query string (operation name excluded) sent with GET.
pub const MAX_GET_QUERY_LENGTH: usize = 2048;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub type BodyStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, TransportError>> + Send>>;

/// Response whose body is consumed at most once.
///
/// The body stream is owned by the response, so dropping the response (on
/// success, error or cancellation) releases the underlying connection.
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    body: BodyStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Response with a fully buffered body.
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::streaming(
            status,
            content_type.map(str::to_string),
            Box::pin(stream::iter([Ok::<_, TransportError>(body)])),
        )
    }

    pub fn streaming(status: u16, content_type: Option<String>, body: BodyStream) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is a binary document.
    pub fn has_binary_content(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|media| media.trim().eq_ignore_ascii_case(CONTENT_TYPE))
        })
    }

    /// Collect the body, observing `cancel` between chunks.
    pub async fn read_body(self, limit: usize, cancel: &CancellationToken) -> Result<Bytes> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    if buf.len() + bytes.len() > limit {
                        return Err(TransportError::BodyTooLarge(limit).into());
                    }
                    buf.extend_from_slice(&bytes);
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(buf.freeze()),
            }
        }
    }
}

/// Capability to send one HTTP request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.uri);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from));
        Ok(HttpResponse::streaming(status, content_type, Box::pin(body)))
    }
}

/// Chooses GET or POST for each call and sends it.
pub struct TransportSelector {
    transport: Arc<dyn HttpTransport>,
    base_uri: String,
    max_query_length: usize,
    headers: Vec<(String, String)>,
}

impl std::fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSelector")
            .field("base_uri", &self.base_uri)
            .field("max_query_length", &self.max_query_length)
            .finish_non_exhaustive()
    }
}

impl TransportSelector {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            base_uri: config.base_uri.trim_end_matches('/').to_string(),
            max_query_length: config.max_get_query_length,
            headers: config.headers.clone(),
        }
    }

    /// Query string for a GET call, or `None` when a parameter cannot be
    /// carried in one.
    ///
    /// Each value is checked against its declared type as it would be for
    /// a body. Null parameters are omitted. Query part expressions are
    /// encoded twice because they are nested inside `$`-prefixed values.
    pub fn build_query_string(
        params: &[BoundParameter],
        query: &[QueryPart],
    ) -> std::result::Result<Option<String>, CodecError> {
        let mut pairs = Vec::with_capacity(params.len() + query.len());
        for param in params {
            match &param.value {
                Payload::ChangeSet(_) => return Ok(None),
                Payload::Value(value) if value.is_null() => {}
                Payload::Value(value) => {
                    let text = param.codec.query_text(value)?;
                    pairs.push(format!("{}={}", param.name, urlencoding::encode(&text)));
                }
            }
        }
        for part in query {
            let once = urlencoding::encode(&part.expression);
            pairs.push(format!("${}={}", part.operator, urlencoding::encode(&once)));
        }
        Ok(Some(pairs.join("&")))
    }

    /// Build the request for one call.
    pub fn prepare(
        &self,
        operation: &str,
        has_side_effects: bool,
        params: &[BoundParameter],
        query: &[QueryPart],
    ) -> Result<HttpRequest> {
        let mut headers = self.headers.clone();
        headers.push(("Accept".to_string(), CONTENT_TYPE.to_string()));

        if !has_side_effects {
            if let Some(qs) = Self::build_query_string(params, query)? {
                if qs.len() <= self.max_query_length {
                    let uri = if qs.is_empty() {
                        format!("{}/{}", self.base_uri, operation)
                    } else {
                        format!("{}/{}?{}", self.base_uri, operation, qs)
                    };
                    debug!(method = "GET", query_length = qs.len(), "Selected transport");
                    return Ok(HttpRequest {
                        method: HttpMethod::Get,
                        uri,
                        headers,
                        body: None,
                    });
                }
                debug!(
                    query_length = qs.len(),
                    limit = self.max_query_length,
                    "Query string too long, falling back to POST"
                );
            }
        }

        let body = encode_to_bytes(operation, params, query)?;
        debug!(method = "POST", body_size = body.len(), "Selected transport");
        headers.push(("Content-Type".to_string(), CONTENT_TYPE.to_string()));
        Ok(HttpRequest {
            method: HttpMethod::Post,
            uri: format!("{}/{}", self.base_uri, operation),
            headers,
            body: Some(body),
        })
    }

    /// Build and send the request, racing it against `cancel`.
    #[instrument(skip(self, params, query, cancel))]
    pub async fn execute(
        &self,
        operation: &str,
        has_side_effects: bool,
        params: &[BoundParameter],
        query: &[QueryPart],
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let request = self.prepare(operation, has_side_effects, params, query)?;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            response = self.transport.send(request) => Ok(response?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::schema::{TypeDescriptor, TypeTable};
    use crate::value::Value;

    fn param(name: &str, value: Value) -> BoundParameter {
        BoundParameter::new(
            name,
            value,
            Arc::new(Codec::new(TypeDescriptor::String, Arc::new(TypeTable::default()))),
        )
    }

    #[test]
    fn test_query_string_layout() {
        let qs = TransportSelector::build_query_string(
            &[param("region", "WA".into()), param("since", Value::Null)],
            &[QueryPart::take(10)],
        )
        .unwrap()
        .unwrap();
        assert_eq!(qs, "region=WA&$take=10");
    }

    #[test]
    fn test_expressions_are_double_encoded() {
        let qs = TransportSelector::build_query_string(
            &[param("q", "a b".into())],
            &[QueryPart::filter("Name == \"x y\"")],
        )
        .unwrap()
        .unwrap();
        assert_eq!(qs, "q=a%20b&$where=Name%2520%253D%253D%2520%2522x%2520y%2522");
    }

    #[test]
    fn test_mistyped_parameter_rejected() {
        let err = TransportSelector::build_query_string(&[param("region", Value::Int(42))], &[])
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_change_set_cannot_use_get() {
        let bound = BoundParameter::new(
            "changeSet",
            Payload::ChangeSet(vec![]),
            Arc::new(Codec::new(TypeDescriptor::ChangeSet, Arc::new(TypeTable::default()))),
        );
        assert_eq!(TransportSelector::build_query_string(&[bound], &[]).unwrap(), None);
    }

    #[test]
    fn test_binary_content_type_match() {
        let response = HttpResponse::new(500, Some("Application/VND.ropc.binary-document; charset=binary"), "");
        assert!(response.has_binary_content());
        assert!(!HttpResponse::new(500, Some("text/html"), "").has_binary_content());
        assert!(!HttpResponse::new(500, None, "").has_binary_content());
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let response = HttpResponse::new(200, None, vec![0u8; 16]);
        let err = response
            .read_body(8, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::BodyTooLarge(8))
        ));
    }

    #[tokio::test]
    async fn test_read_body_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let response = HttpResponse::new(200, None, "body");
        assert!(matches!(
            response.read_body(1024, &cancel).await,
            Err(ClientError::Cancelled)
        ));
    }
}
