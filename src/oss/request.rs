//! Single signed HTTP exchange with the object store
//!
//! A [`Request`] is built for exactly one operation, signs itself right
//! before it is sent and classifies the response:
//! - success: the body is discarded, collected, copied into a sink, or handed
//!   to a background task
//! - `404` on a `HEAD` probe: not an error
//! - anything else: the body is parsed as an `<Error>` document and its
//!   message becomes the error, falling back to the trimmed raw body

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE};
use hyper::{Method, StatusCode};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::oss::client::Client;
use crate::oss::error::{OssError, Result};
use crate::oss::signer::{canonical_resource, StringToSign};
use crate::oss::types::parse_response_error;

/// Content type sent when the caller gives none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Format a timestamp the way the `Date` header expects it
/// (`Mon, 02 Jan 2006 15:04:05 GMT`, always UTC).
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Encode an object key for the URL path, preserving forward slashes.
/// Returns Cow::Borrowed when no encoding is needed.
fn encode_path(path: &str) -> Cow<'_, str> {
    let needs_encoding = path.bytes().any(|b| {
        !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/')
    });

    if !needs_encoding {
        return Cow::Borrowed(path);
    }

    let mut result = String::with_capacity(path.len() + 32);
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                result.push(byte as char);
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    Cow::Owned(result)
}

/// Prepend `/` to a remote path unless it already has one
pub(crate) fn absolute_path(remote: &str) -> Cow<'_, str> {
    if remote.starts_with('/') {
        Cow::Borrowed(remote)
    } else {
        Cow::Owned(format!("/{}", remote))
    }
}

/// Turn a non-success response body into an error
pub(crate) fn service_error(status: StatusCode, body: &[u8]) -> OssError {
    if let Some(parsed) = parse_response_error(body) {
        return OssError::Service {
            status,
            code: Some(parsed.code).filter(|c| !c.is_empty()),
            message: parsed.message,
            request_id: Some(parsed.request_id).filter(|r| !r.is_empty()),
            host_id: Some(parsed.host_id).filter(|h| !h.is_empty()),
        };
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    let message = if text.is_empty() {
        // HEAD responses never carry a body
        status.to_string()
    } else {
        text
    };
    OssError::Service {
        status,
        code: None,
        message,
        request_id: None,
        host_id: None,
    }
}

/// Summary of a finished request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub url: String,
    pub status: StatusCode,
    /// `Content-Length` declared by the response, if any
    pub content_length: Option<u64>,
}

/// One HTTP operation against the bucket
pub struct Request<'a> {
    client: &'a Client,
    method: Method,
    remote: String,
    queries: BTreeMap<String, Option<String>>,
    content_type: String,
    content_md5: String,
    date: String,
    body: Bytes,
    status: Option<StatusCode>,
    response_content_length: Option<u64>,
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url())
            .field("content_type", &self.content_type)
            .field("content_md5", &self.content_md5)
            .field("date", &self.date)
            .field("body_len", &self.body.len())
            .field("status", &self.status)
            .finish()
    }
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl<'a> Request<'a> {
    pub fn new(client: &'a Client, method: Method, remote: impl Into<String>) -> Self {
        Self {
            client,
            method,
            remote: remote.into(),
            queries: BTreeMap::new(),
            content_type: String::new(),
            content_md5: String::new(),
            date: String::new(),
            body: Bytes::new(),
            status: None,
            response_content_length: None,
        }
    }

    /// Add a `key=value` query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_query(key, value);
        self
    }

    /// Add a valueless query parameter (`?delete`)
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.queries.insert(key.into(), None);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Attach a request body, with the raw MD5 digest of its bytes when the
    /// service should verify it
    pub fn body(mut self, body: impl Into<Bytes>, content_md5: Option<&[u8]>) -> Self {
        self.body = body.into();
        self.content_md5 = content_md5.map(|d| BASE64.encode(d)).unwrap_or_default();
        self
    }

    pub(crate) fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.queries.insert(key.into(), Some(value.into()));
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Status of the last response, once executed
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// `Content-Length` declared by the last response, once executed
    pub fn response_content_length(&self) -> Option<u64> {
        self.response_content_length
    }

    /// Base64 Content-MD5 that will be sent (empty when none)
    pub fn content_md5(&self) -> &str {
        &self.content_md5
    }

    /// `/`-prefixed remote path, unencoded
    fn path(&self) -> Cow<'_, str> {
        absolute_path(&self.remote)
    }

    fn query_string(&self) -> String {
        let mut qs = String::new();
        for (key, value) in &self.queries {
            if !qs.is_empty() {
                qs.push('&');
            }
            qs.push_str(&urlencoding::encode(key));
            if let Some(value) = value {
                qs.push('=');
                qs.push_str(&urlencoding::encode(value));
            }
        }
        qs
    }

    /// Full request URL
    pub fn url(&self) -> String {
        let path = self.path();
        let mut url = format!(
            "{}{}",
            self.client.prefix().trim_end_matches('/'),
            encode_path(&path)
        );
        let qs = self.query_string();
        if !qs.is_empty() {
            url.push('?');
            url.push_str(&qs);
        }
        url
    }

    /// Canonicalized resource this request is signed over
    pub fn canonical_resource(&self) -> String {
        canonical_resource(self.client.bucket(), &self.path(), &self.queries)
    }

    pub fn receipt(&self) -> Option<Receipt> {
        self.status.map(|status| Receipt {
            url: self.url(),
            status,
            content_length: self.response_content_length,
        })
    }

    /// Sign and send. Returns the body of a successful response, `None` for a
    /// `404` on a `HEAD` probe, and the service error otherwise.
    pub async fn send(&mut self) -> Result<Option<Incoming>> {
        if self.content_type.is_empty() {
            self.content_type = DEFAULT_CONTENT_TYPE.to_string();
        }
        self.date = http_date(Utc::now());

        let url = self.url();
        let canonical_resource = self.canonical_resource();
        let authorization = self.client.signer().authorization(&StringToSign {
            method: self.method.as_str(),
            content_md5: &self.content_md5,
            content_type: &self.content_type,
            date: &self.date,
            canonical_resource: &canonical_resource,
        });

        let mut builder = hyper::Request::builder()
            .method(self.method.clone())
            .uri(&url)
            .header(CONTENT_TYPE, &self.content_type)
            .header(DATE, &self.date);
        if !self.content_md5.is_empty() {
            builder = builder.header("Content-MD5", &self.content_md5);
        }
        let request = builder
            .header(AUTHORIZATION, authorization)
            .body(Full::new(self.body.clone()))?;

        let response = self.client.http().request(request).await?;

        let status = response.status();
        self.status = Some(status);
        self.response_content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        debug!(
            method = %self.method,
            url = %url,
            status = status.as_u16(),
            content_length = ?self.response_content_length,
            "OSS request completed"
        );

        if status.is_success() {
            return Ok(Some(response.into_body()));
        }

        if status == StatusCode::NOT_FOUND && self.method == Method::HEAD {
            return Ok(None);
        }

        let body = response.into_body().collect().await?.to_bytes();
        let error = service_error(status, &body);
        warn!(
            method = %self.method,
            url = %url,
            status = status.as_u16(),
            code = ?error.code(),
            "OSS request failed: {}",
            error
        );
        Err(error)
    }

    /// Execute and discard any response body
    pub async fn execute(&mut self) -> Result<Receipt> {
        let _ = self.send().await?;
        Ok(self.finished())
    }

    /// Execute and collect the whole response body
    pub async fn execute_collect(&mut self) -> Result<Bytes> {
        match self.send().await? {
            Some(body) => Ok(body.collect().await?.to_bytes()),
            None => Ok(Bytes::new()),
        }
    }

    /// Execute and stream the response body into `sink`, returning once the
    /// body is fully drained
    pub async fn execute_into<W>(&mut self, sink: &mut W) -> Result<Receipt>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if let Some(body) = self.send().await? {
            copy_body(body, sink).await?;
        }
        Ok(self.finished())
    }

    /// Execute and copy the response body into `sink` on a spawned task.
    /// Returns as soon as the response status is known.
    pub async fn execute_in_background<W>(&mut self, mut sink: W) -> Result<DownloadTask<W>>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let body = self.send().await?;
        let receipt = self.finished();
        let handle = tokio::spawn(async move {
            let copied = match body {
                Some(body) => copy_body(body, &mut sink).await?,
                None => 0,
            };
            Ok((sink, copied))
        });
        Ok(DownloadTask { receipt, handle })
    }

    fn finished(&self) -> Receipt {
        Receipt {
            url: self.url(),
            status: self.status.unwrap_or(StatusCode::OK),
            content_length: self.response_content_length,
        }
    }
}

/// Stream a response body into a writer, returning the number of bytes copied
pub(crate) async fn copy_body<W>(mut body: Incoming, sink: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut total_bytes = 0u64;
    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(chunk) = frame.data_ref() {
            sink.write_all(chunk).await?;
            total_bytes += chunk.len() as u64;
        }
    }
    sink.flush().await?;
    Ok(total_bytes)
}

/// Handle to a download whose body is being copied on a background task.
///
/// Dropping the handle detaches the task: the copy still runs to completion
/// and any error it hits is lost.
#[derive(Debug)]
pub struct DownloadTask<W> {
    receipt: Receipt,
    handle: JoinHandle<Result<(W, u64)>>,
}

impl<W> DownloadTask<W> {
    /// Response summary, available before the body is copied
    pub fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the copy
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the copy to finish; yields the sink back with the number of
    /// bytes written into it
    pub async fn wait(self) -> Result<(W, u64)> {
        self.handle.await?
    }
}
