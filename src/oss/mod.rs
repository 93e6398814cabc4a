//! OSS client module with header signing
//!
//! This module provides:
//! - HMAC-SHA1 request and policy signing
//! - Async object operations (upload, download, exists, image info)
//! - Paginated listing and batched multi-key deletion
//! - Browser upload policies

pub mod client;
pub mod delete;
pub mod error;
pub mod list;
pub mod policy;
pub mod request;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use delete::{BatchDeleter, KeyFilter, MAX_DELETE_KEYS};
pub use error::{OssError, Result};
pub use list::{normalize_prefix, Paginator, MAX_KEYS_PER_PAGE};
pub use policy::{PolicyCondition, PostPolicy, DEFAULT_POLICY_DURATION};
pub use request::{DownloadTask, Receipt, Request, DEFAULT_CONTENT_TYPE};
pub use signer::{Signer, StringToSign};
pub use types::{DeleteOutcome, Directory, File, ImageInfo, ListResult, ResponseError};
