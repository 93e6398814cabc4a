//! In-process mock of an OSS bucket for integration tests
//!
//! Verifies every request's `Authorization` header on its own (it does not
//! reuse the crate's signer), keeps objects in memory, and records requests
//! so tests can count round trips.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use quick_xml::events::Event;
use quick_xml::Reader;
use sha1::Sha1;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use osslite::Client;

pub const ACCESS_KEY_ID: &str = "mock-access-id";
pub const ACCESS_KEY_SECRET: &str = "mock-access-secret";
pub const BUCKET: &str = "mock-bucket";

const SUB_RESOURCES: &[&str] = &["acl", "delete", "location", "uploadId", "uploads", "x-oss-process"];

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

/// One request as the mock received it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Percent-decoded path
    pub path: String,
    /// Percent-decoded query parameters; `None` for valueless ones
    pub query: BTreeMap<String, Option<String>>,
    pub date: String,
    pub content_type: String,
    pub content_md5: String,
    pub authorization: String,
    pub body: Bytes,
}

#[derive(Debug)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    page_size: usize,
    stalled_listing: bool,
    fail_deletes: bool,
    injected: HashMap<String, (StatusCode, String)>,
    requests: Vec<RecordedRequest>,
    next_request_id: u64,
}

/// Handle to a running mock server; the server stops when this is dropped
pub struct MockOss {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    server: JoinHandle<()>,
}

impl Drop for MockOss {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockOss {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(Mutex::new(State {
            objects: BTreeMap::new(),
            page_size: 1000,
            stalled_listing: false,
            fail_deletes: false,
            injected: HashMap::new(),
            requests: Vec::new(),
            next_request_id: 1,
        }));

        let server_state = Arc::clone(&state);
        let server = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => continue,
                };
                let state = Arc::clone(&server_state);

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle(state, req).await) }
                    });
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        });

        Self { addr, state, server }
    }

    pub fn prefix(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> Client {
        self.client_with_secret(ACCESS_KEY_SECRET)
    }

    pub fn client_with_secret(&self, secret: &str) -> Client {
        Client::new(ACCESS_KEY_ID, secret, self.prefix(), BUCKET).unwrap()
    }

    pub fn put(&self, key: &str, data: impl Into<Bytes>) {
        self.state.lock().unwrap().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    /// Maximum entries per listing page, regardless of `max-keys`
    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().unwrap().page_size = page_size;
    }

    /// Report every listing page as truncated without advancing the marker
    pub fn set_stalled_listing(&self, stalled: bool) {
        self.state.lock().unwrap().stalled_listing = stalled;
    }

    /// Answer every batch delete with an internal error
    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }

    /// Answer every request for `path` with a plain-text body and `status`
    pub fn inject_failure(&self, path: &str, status: StatusCode, body: &str) {
        self.state
            .lock()
            .unwrap()
            .injected
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count_requests(&self, method: &Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| &r.method == method && r.path == path)
            .count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }
}

/// Base64 HMAC-SHA1, computed the way the service documents it
pub fn expected_signature(secret: &str, string_to_sign: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

fn parse_query(query: Option<&str>) -> BTreeMap<String, Option<String>> {
    let mut params = BTreeMap::new();
    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((k, v)) => params.insert(decode(k), Some(decode(v))),
            None => params.insert(decode(pair), None),
        };
    }
    params
}

fn header(req: &Request<Incoming>, name: &str) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn canonical_resource(path: &str, query: &BTreeMap<String, Option<String>>) -> String {
    let subs: Vec<String> = query
        .iter()
        .filter(|(k, _)| SUB_RESOURCES.contains(&k.as_str()))
        .map(|(k, v)| match v {
            Some(v) => format!("{}={}", k, v),
            None => k.clone(),
        })
        .collect();
    let mut resource = format!("/{}{}", BUCKET, path);
    if !subs.is_empty() {
        resource.push('?');
        resource.push_str(&subs.join("&"));
    }
    resource
}

fn response(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(body.into()))
        .unwrap()
}

fn error_response(state: &Mutex<State>, method: &Method, status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    if method == Method::HEAD {
        return response(status, "application/xml", Bytes::new());
    }
    let request_id = {
        let mut state = state.lock().unwrap();
        state.next_request_id += 1;
        format!("MOCK{:08}", state.next_request_id)
    };
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error>\n  <Code>{}</Code>\n  <Message>{}</Message>\n  <RequestId>{}</RequestId>\n  <HostId>{}.mock.local</HostId>\n</Error>\n",
        code,
        escape(message),
        request_id,
        BUCKET
    );
    response(status, "application/xml", body)
}

async fn handle(state: Arc<Mutex<State>>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = decode(req.uri().path());
    let query = parse_query(req.uri().query());
    let date = header(&req, "date");
    let content_type = header(&req, "content-type");
    let content_md5 = header(&req, "content-md5");
    let authorization = header(&req, "authorization");
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let injected = {
        let mut s = state.lock().unwrap();
        s.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            query: query.clone(),
            date: date.clone(),
            content_type: content_type.clone(),
            content_md5: content_md5.clone(),
            authorization: authorization.clone(),
            body: body.clone(),
        });
        s.injected.get(&path).cloned()
    };

    if let Some((status, text)) = injected {
        return response(status, "text/plain", text);
    }

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}\n{}",
        method,
        content_md5,
        content_type,
        date,
        canonical_resource(&path, &query)
    );
    let expected = format!(
        "OSS {}:{}",
        ACCESS_KEY_ID,
        expected_signature(ACCESS_KEY_SECRET, &string_to_sign)
    );
    if date.is_empty() || authorization != expected {
        return error_response(
            &state,
            &method,
            StatusCode::FORBIDDEN,
            "SignatureDoesNotMatch",
            "The request signature we calculated does not match the signature you provided.",
        );
    }

    if !content_md5.is_empty() && content_md5 != BASE64.encode(md5::compute(&body).0) {
        return error_response(
            &state,
            &method,
            StatusCode::BAD_REQUEST,
            "InvalidDigest",
            "The Content-MD5 you specified was invalid.",
        );
    }

    match (&method, path.as_str()) {
        (&Method::GET, "/") => list_objects(&state, &query),
        (&Method::POST, "/") if query.contains_key("delete") => {
            if state.lock().unwrap().fail_deletes {
                return error_response(
                    &state,
                    &method,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "We encountered an internal error. Please try again.",
                );
            }
            delete_objects(&state, &body)
        }
        (&Method::PUT, key) => {
            let key = key.trim_start_matches('/').to_string();
            let etag = format!("\"{:X}\"", md5::compute(&body));
            state.lock().unwrap().objects.insert(
                key,
                StoredObject {
                    data: body,
                    content_type,
                },
            );
            Response::builder()
                .status(StatusCode::OK)
                .header("ETag", etag)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
        (&Method::HEAD, key) => {
            let object = state.lock().unwrap().objects.get(key.trim_start_matches('/')).cloned();
            match object {
                Some(object) => Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", object.content_type)
                    .header("Content-Length", object.data.len())
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
                None => response(StatusCode::NOT_FOUND, "application/xml", Bytes::new()),
            }
        }
        (&Method::GET, key) => {
            let key = key.trim_start_matches('/');
            let object = state.lock().unwrap().objects.get(key).cloned();
            let Some(object) = object else {
                return error_response(
                    &state,
                    &method,
                    StatusCode::NOT_FOUND,
                    "NoSuchKey",
                    "The specified key does not exist.",
                );
            };

            if query.get("x-oss-process") == Some(&Some("image/info".to_string())) {
                return image_info(&state, &method, key, &object);
            }
            response(StatusCode::OK, &object.content_type, object.data)
        }
        _ => error_response(
            &state,
            &method,
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowed",
            "The specified method is not allowed against this resource.",
        ),
    }
}

fn image_info(state: &Mutex<State>, method: &Method, key: &str, object: &StoredObject) -> Response<Full<Bytes>> {
    if !key.ends_with(".png") {
        return error_response(
            state,
            method,
            StatusCode::BAD_REQUEST,
            "BadRequest",
            "This image format is not supported.",
        );
    }
    let body = format!(
        r#"{{"FileSize":{{"value":"{}"}},"Format":{{"value":"png"}},"ImageHeight":{{"value":"480"}},"ImageWidth":{{"value":"640"}}}}"#,
        object.data.len()
    );
    response(StatusCode::OK, "application/json", body)
}

enum Entry {
    File(String, StoredObject),
    Dir(String),
}

fn list_objects(state: &Mutex<State>, query: &BTreeMap<String, Option<String>>) -> Response<Full<Bytes>> {
    let param = |name: &str| query.get(name).cloned().flatten().unwrap_or_default();
    let prefix = param("prefix");
    let marker = param("marker");
    let delimiter = param("delimiter");
    let max_keys: usize = param("max-keys").parse().unwrap_or(1000);

    let state = state.lock().unwrap();
    let page_size = max_keys.min(state.page_size).max(1);

    let mut entries = Vec::new();
    let mut seen_dirs = BTreeSet::new();
    for (key, object) in state.objects.range::<String, _>((
        std::ops::Bound::Excluded(&marker),
        std::ops::Bound::Unbounded,
    )) {
        if !key.starts_with(&prefix) {
            continue;
        }
        if !delimiter.is_empty() {
            if marker.ends_with(&delimiter) && key.starts_with(&marker) {
                continue;
            }
            let rest = &key[prefix.len()..];
            if let Some(idx) = rest.find(&delimiter) {
                let dir = format!("{}{}", prefix, &rest[..idx + delimiter.len()]);
                if seen_dirs.insert(dir.clone()) {
                    entries.push(Entry::Dir(dir));
                }
                continue;
            }
        }
        entries.push(Entry::File(key.clone(), object.clone()));
    }

    let truncated = state.stalled_listing || entries.len() > page_size;
    entries.truncate(page_size);
    let next_marker = if state.stalled_listing {
        marker.clone()
    } else {
        match entries.last() {
            Some(Entry::File(key, _)) => key.clone(),
            Some(Entry::Dir(dir)) => dir.clone(),
            None => String::new(),
        }
    };

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListBucketResult>\n");
    xml.push_str(&format!("  <Name>{}</Name>\n", BUCKET));
    xml.push_str(&format!("  <Prefix>{}</Prefix>\n", escape(&prefix)));
    xml.push_str(&format!("  <Marker>{}</Marker>\n", escape(&marker)));
    xml.push_str(&format!("  <MaxKeys>{}</MaxKeys>\n", max_keys));
    xml.push_str(&format!("  <Delimiter>{}</Delimiter>\n", escape(&delimiter)));
    xml.push_str(&format!("  <IsTruncated>{}</IsTruncated>\n", truncated));
    if truncated {
        xml.push_str(&format!("  <NextMarker>{}</NextMarker>\n", escape(&next_marker)));
    }
    for entry in &entries {
        if let Entry::File(key, object) = entry {
            xml.push_str(&format!(
                "  <Contents>\n    <Key>{}</Key>\n    <LastModified>2026-01-02T03:04:05.000Z</LastModified>\n    <ETag>\"{:X}\"</ETag>\n    <Type>Normal</Type>\n    <Size>{}</Size>\n    <StorageClass>Standard</StorageClass>\n  </Contents>\n",
                escape(key),
                md5::compute(&object.data),
                object.data.len()
            ));
        }
    }
    for entry in &entries {
        if let Entry::Dir(dir) = entry {
            xml.push_str(&format!(
                "  <CommonPrefixes>\n    <Prefix>{}</Prefix>\n  </CommonPrefixes>\n",
                escape(dir)
            ));
        }
    }
    xml.push_str("</ListBucketResult>\n");

    response(StatusCode::OK, "application/xml", xml)
}

fn delete_objects(state: &Mutex<State>, body: &[u8]) -> Response<Full<Bytes>> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut in_key = false;
    let mut keys = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"Key" => in_key = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"Key" => in_key = false,
            Ok(Event::Text(e)) if in_key => {
                if let Ok(text) = e.unescape() {
                    keys.push(text.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => {
                return response(
                    StatusCode::BAD_REQUEST,
                    "application/xml",
                    "<Error><Code>MalformedXML</Code><Message>The XML you provided was not well-formed.</Message></Error>",
                )
            }
            _ => {}
        }
        buf.clear();
    }

    let mut state = state.lock().unwrap();
    for key in &keys {
        state.objects.remove(key);
    }

    response(
        StatusCode::OK,
        "application/xml",
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<DeleteResult>\n</DeleteResult>\n",
    )
}
