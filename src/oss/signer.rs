//! OSS header signer
//!
//! Every request carries `Authorization: OSS <AccessKeyId>:<Signature>` where
//!
//! ```text
//! Signature = Base64(HMAC-SHA1(AccessKeySecret,
//!     VERB + "\n" + Content-MD5 + "\n" + Content-Type + "\n" + Date + "\n" +
//!     CanonicalizedResource))
//! ```
//!
//! Browser upload policies are signed with the same keyed hash over the
//! base64 policy document.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;
use std::fmt;

type HmacSha1 = Hmac<Sha1>;

/// Query parameters that name a sub-resource and therefore take part in the
/// canonicalized resource. Kept sorted.
const SUB_RESOURCES: &[&str] = &[
    "acl",
    "append",
    "cors",
    "delete",
    "lifecycle",
    "location",
    "logging",
    "partNumber",
    "position",
    "referer",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "security-token",
    "symlink",
    "tagging",
    "uploadId",
    "uploads",
    "website",
    "x-oss-process",
];

/// The five values that are both sent as headers and signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringToSign<'a> {
    pub method: &'a str,
    pub content_md5: &'a str,
    pub content_type: &'a str,
    pub date: &'a str,
    pub canonical_resource: &'a str,
}

impl fmt::Display for StringToSign<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}\n{}",
            self.method, self.content_md5, self.content_type, self.date, self.canonical_resource
        )
    }
}

/// Signer holding the account credentials
#[derive(Clone)]
pub struct Signer {
    access_key_id: String,
    access_key_secret: String,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .finish()
    }
}

impl Signer {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Base64 HMAC-SHA1 signature of the string to sign
    pub fn sign(&self, input: &StringToSign<'_>) -> String {
        self.sign_bytes(input.to_string().as_bytes())
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self, input: &StringToSign<'_>) -> String {
        format!("OSS {}:{}", self.access_key_id, self.sign(input))
    }

    /// Signature for a base64-encoded POST policy document
    pub fn sign_policy(&self, policy: &str) -> String {
        self.sign_bytes(policy.as_bytes())
    }

    fn sign_bytes(&self, msg: &[u8]) -> String {
        BASE64.encode(Self::hmac_sha1(self.access_key_secret.as_bytes(), msg))
    }

    /// HMAC-SHA1 returning fixed-size array
    fn hmac_sha1(key: &[u8], msg: &[u8]) -> [u8; 20] {
        let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(msg);
        let result = mac.finalize().into_bytes();
        let mut output = [0u8; 20];
        output.copy_from_slice(&result);
        output
    }
}

/// Build the canonicalized resource: `/` + bucket + path, followed by the
/// sub-resource parameters of `queries` in key order.
///
/// `path` must already start with `/`. Values are used raw (not
/// percent-encoded); `None` marks a valueless parameter such as `?delete`.
pub fn canonical_resource(
    bucket: &str,
    path: &str,
    queries: &BTreeMap<String, Option<String>>,
) -> String {
    let mut resource = String::with_capacity(1 + bucket.len() + path.len() + 32);
    resource.push('/');
    resource.push_str(bucket);
    resource.push_str(path);

    let mut first = true;
    for (key, value) in queries {
        if SUB_RESOURCES.binary_search(&key.as_str()).is_err() {
            continue;
        }
        resource.push(if first { '?' } else { '&' });
        first = false;
        resource.push_str(key);
        if let Some(value) = value {
            resource.push('=');
            resource.push_str(value);
        }
    }
    resource
}
