//! Paginated bucket listing
//!
//! Pages are fetched strictly in order with a single reused [`Request`] whose
//! `marker` parameter advances to the service's `NextMarker` until the
//! service reports the listing as complete.

use hyper::Method;
use tracing::debug;

use crate::oss::client::Client;
use crate::oss::error::{OssError, Result};
use crate::oss::request::Request;
use crate::oss::types::{parse_list_page, ListPage, ListResult};

/// Entries requested per page (service maximum)
pub const MAX_KEYS_PER_PAGE: usize = 1000;

/// Normalize a listing prefix: no leading slash, exactly one trailing slash,
/// and the empty prefix (or `/`) lists the whole bucket.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Walks every page of a listing
pub struct Paginator<'a> {
    request: Request<'a>,
    marker: String,
    done: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a Client, prefix: &str, recursive: bool) -> Self {
        let mut request = Request::new(client, Method::GET, "/")
            .query("max-keys", MAX_KEYS_PER_PAGE.to_string())
            .query("prefix", normalize_prefix(prefix))
            .query("marker", "");
        if !recursive {
            request.set_query("delimiter", "/");
        }
        Self {
            request,
            marker: String::new(),
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the listing is exhausted
    pub(crate) async fn next_page(&mut self) -> Result<Option<ListPage>> {
        if self.done {
            return Ok(None);
        }

        self.request.set_query("marker", self.marker.clone());
        let body = self.request.execute_collect().await?;
        let page = parse_list_page(&body)?;

        debug!(
            prefix = %page.prefix,
            marker = %self.marker,
            files = page.files.len(),
            dirs = page.dirs.len(),
            truncated = page.is_truncated,
            "Fetched listing page"
        );

        if page.is_truncated {
            if page.next_marker.is_empty() || page.next_marker == self.marker {
                self.done = true;
                return Err(OssError::StalledListing {
                    marker: self.marker.clone(),
                });
            }
            self.marker = page.next_marker.clone();
        } else {
            self.done = true;
        }
        Ok(Some(page))
    }

    /// Fetch all remaining pages into one result
    pub async fn collect(mut self) -> Result<ListResult> {
        let mut result = ListResult::default();
        while let Some(page) = self.next_page().await? {
            result.files.extend(page.files);
            result.dirs.extend(page.dirs);
            result.prefix = page.prefix;
        }
        Ok(result)
    }
}
