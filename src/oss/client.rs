//! OSS client facade
//!
//! Holds the credentials, endpoint prefix and bucket, and exposes the
//! high-level operations. Clone is cheap: clones share the same HTTP
//! connection pool. Every operation builds its own [`Request`], so one client
//! can serve any number of concurrent callers.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Method;
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncWrite;

use crate::oss::delete::{BatchDeleter, KeyFilter};
use crate::oss::error::Result;
use crate::oss::list::Paginator;
use crate::oss::policy::{PolicyCondition, PostPolicy};
use crate::oss::request::{absolute_path, DownloadTask, Receipt, Request};
use crate::oss::signer::Signer;
use crate::oss::types::{parse_image_info, DeleteOutcome, ImageInfo, ListResult};

pub(crate) type HttpClient = HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Client for one bucket of an OSS-style object store
#[derive(Clone)]
pub struct Client {
    http: HttpClient,
    signer: Signer,
    /// Endpoint prefix, e.g. `https://<bucket>.<region>.aliyuncs.com`
    prefix: String,
    bucket: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("signer", &self.signer)
            .field("prefix", &self.prefix)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl Client {
    /// Create a client. `prefix` is the bucket endpoint, such as
    /// `https://<bucket>.oss-cn-hangzhou.aliyuncs.com`.
    pub fn new(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        prefix: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let tls = TlsConnector::new()?;
        let https = HttpsConnector::from((http, tls.into()));
        let http = HyperClient::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            http,
            signer: Signer::new(access_key_id, access_key_secret),
            prefix: prefix.into(),
            bucket: bucket.into(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn access_key_id(&self) -> &str {
        self.signer.access_key_id()
    }

    pub(crate) fn signer(&self) -> &Signer {
        &self.signer
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Start building a raw request against `remote`
    pub fn request(&self, method: Method, remote: impl Into<String>) -> Request<'_> {
        Request::new(self, method, remote)
    }

    /// Public URL of a remote file, without query string
    pub fn url(&self, remote: &str) -> String {
        format!("{}{}", self.prefix.trim_end_matches('/'), absolute_path(remote))
    }

    /// Probe a remote file with `HEAD`. A `404` is reported as `Ok(false)`.
    pub async fn exists(&self, remote: &str) -> Result<bool> {
        let mut req = self.request(Method::HEAD, remote);
        let found = req.send().await?.is_some();
        Ok(found)
    }

    /// Fetch width, height, size and format of a remote image. Files that are
    /// not images yield the service's error message.
    pub async fn image_info(&self, remote: &str) -> Result<ImageInfo> {
        let body = self
            .request(Method::GET, remote)
            .query("x-oss-process", "image/info")
            .execute_collect()
            .await?;
        parse_image_info(&body)
    }

    /// Upload `body` to `remote`.
    ///
    /// When `content_md5` (the raw 16-byte digest of `body`) is given, the
    /// service verifies it and rejects mismatching uploads. A missing
    /// `content_type` is sent as `application/octet-stream`.
    pub async fn upload(
        &self,
        remote: &str,
        body: impl Into<Bytes>,
        content_md5: Option<&[u8]>,
        content_type: Option<&str>,
    ) -> Result<Receipt> {
        let mut req = self
            .request(Method::PUT, remote)
            .body(body, content_md5)
            .content_type(content_type.unwrap_or_default());
        req.execute().await
    }

    /// Download `remote` into `sink`, returning once the body is fully written
    pub async fn download<W>(&self, remote: &str, sink: &mut W) -> Result<Receipt>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.request(Method::GET, remote).execute_into(sink).await
    }

    /// Like [`Client::download`] but returns as soon as the response headers
    /// arrive; the body is copied into `sink` on a background task.
    pub async fn download_in_background<W>(&self, remote: &str, sink: W) -> Result<DownloadTask<W>>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.request(Method::GET, remote)
            .execute_in_background(sink)
            .await
    }

    /// List files and directories under `prefix`, following every page.
    /// Non-recursive listings group keys by their next `/` segment into
    /// directories.
    pub async fn list(&self, prefix: &str, recursive: bool) -> Result<ListResult> {
        Paginator::new(self, prefix, recursive).collect().await
    }

    /// Delete any number of keys, 1000 per request
    pub async fn delete<S: AsRef<str>>(&self, keys: &[S]) -> Result<()> {
        BatchDeleter::new(self).delete(keys).await
    }

    /// Delete every file under `prefix` except those matched by one of the
    /// `exceptions`. If the delete fails, nothing is reported as deleted.
    pub async fn delete_recursive(
        &self,
        prefix: &str,
        exceptions: &[KeyFilter<'_>],
    ) -> (DeleteOutcome, Result<()>) {
        BatchDeleter::new(self)
            .delete_recursive(prefix, exceptions)
            .await
    }

    /// Form fields for a browser to upload `key` straight to the bucket.
    ///
    /// `max_size` of 0 means unlimited; a zero `duration` means 10 minutes.
    /// The map holds `key`, `policy`, `OSSAccessKeyId` and `signature`.
    pub fn post_form(
        &self,
        key: &str,
        max_size: u64,
        duration: Duration,
        extra_conditions: &[PolicyCondition],
    ) -> Result<BTreeMap<String, String>> {
        PostPolicy::new(key)
            .max_size(max_size)
            .duration(duration)
            .conditions(extra_conditions.iter().cloned())
            .form_fields(self)
    }
}
