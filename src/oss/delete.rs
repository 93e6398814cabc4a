//! Batched multi-key deletion
//!
//! Keys are sent in quiet `<Delete>` documents of at most
//! [`MAX_DELETE_KEYS`] entries, one `POST /?delete` per chunk, strictly in
//! order. The first failing chunk stops the whole operation; chunks already
//! sent stay deleted and nothing is retried.

use hyper::Method;
use tracing::{debug, info};

use crate::oss::client::Client;
use crate::oss::error::Result;
use crate::oss::types::DeleteOutcome;

/// Keys per delete request (service maximum)
pub const MAX_DELETE_KEYS: usize = 1000;

/// Predicate marking keys that a recursive delete must keep
pub type KeyFilter<'f> = &'f (dyn Fn(&str) -> bool + Send + Sync);

/// Escape XML special characters into an existing buffer
fn xml_escape_into(buf: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}

/// Build the quiet delete document for one chunk of keys. A single leading
/// `/` is stripped from every key.
pub fn encode_delete_body<S: AsRef<str>>(keys: &[S]) -> String {
    let mut xml = String::with_capacity(keys.len() * 60 + 96);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<Delete><Quiet>true</Quiet>");
    for key in keys {
        let key = key.as_ref();
        xml.push_str("<Object><Key>");
        xml_escape_into(&mut xml, key.strip_prefix('/').unwrap_or(key));
        xml.push_str("</Key></Object>");
    }
    xml.push_str("</Delete>");
    xml
}

/// Issues batch deletes for one client
pub struct BatchDeleter<'a> {
    client: &'a Client,
}

impl<'a> BatchDeleter<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Delete all `keys`. An empty slice sends nothing.
    pub async fn delete<S: AsRef<str>>(&self, keys: &[S]) -> Result<()> {
        for chunk in keys.chunks(MAX_DELETE_KEYS) {
            self.delete_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn delete_chunk<S: AsRef<str>>(&self, chunk: &[S]) -> Result<()> {
        let body = encode_delete_body(chunk).into_bytes();
        let digest = md5::compute(&body);

        self.client
            .request(Method::POST, "/")
            .flag("delete")
            .content_type("application/xml")
            .body(body, Some(&digest[..]))
            .execute()
            .await?;

        info!("Deleted {} objects", chunk.len());
        Ok(())
    }

    /// Delete every file under `prefix` (listed recursively) unless one of
    /// `exceptions` matches its key.
    ///
    /// On failure all candidates are moved to `undeleted`, `deleted` is left
    /// empty, and the error is returned next to the outcome.
    pub async fn delete_recursive(
        &self,
        prefix: &str,
        exceptions: &[KeyFilter<'_>],
    ) -> (DeleteOutcome, Result<()>) {
        let mut outcome = DeleteOutcome::default();

        let list = match self.client.list(prefix, true).await {
            Ok(list) => list,
            Err(e) => return (outcome, Err(e)),
        };

        for key in list.keys() {
            if exceptions.iter().any(|except| except(key)) {
                outcome.undeleted.push(key.to_string());
            } else {
                outcome.deleted.push(key.to_string());
            }
        }
        debug!(
            prefix = %prefix,
            candidates = outcome.deleted.len(),
            kept = outcome.undeleted.len(),
            "Recursive delete partitioned keys"
        );

        if let Err(e) = self.delete(&outcome.deleted).await {
            let deleted = std::mem::take(&mut outcome.deleted);
            outcome.undeleted.extend(deleted);
            return (outcome, Err(e));
        }
        (outcome, Ok(()))
    }
}
