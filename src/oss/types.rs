//! OSS types and response structures

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::oss::error::{OssError, Result};

/// Object entry of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Object key
    pub name: String,
    /// Last modified timestamp, as reported by the service
    pub last_modified: String,
    /// ETag (quoted, as reported by the service)
    pub etag: String,
    /// Object size in bytes
    pub size: u64,
}

/// Common prefix ("folder") entry of a non-recursive listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub name: String,
}

/// Aggregated result of a (possibly multi-page) listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    /// Prefix echoed back by the service
    pub prefix: String,
    pub files: Vec<File>,
    pub dirs: Vec<Directory>,
}

impl ListResult {
    /// Keys of all listed files, in listing order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }
}

/// Image metadata returned by the `image/info` processor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub size: u64,
    pub format: String,
    pub width: u32,
    pub height: u32,
}

/// Outcome of a recursive delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub undeleted: Vec<String>,
}

/// Structured error body (`<Error>...</Error>`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub host_id: String,
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub(crate) struct ListPage {
    pub prefix: String,
    pub is_truncated: bool,
    pub next_marker: String,
    pub files: Vec<File>,
    pub dirs: Vec<Directory>,
}

fn xml_reader(xml_data: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;
    reader
}

/// Parse a `ListBucketResult` document
pub(crate) fn parse_list_page(xml_data: &[u8]) -> Result<ListPage> {
    let mut reader = xml_reader(xml_data);

    let mut page = ListPage::default();
    let mut current_file: Option<File> = None;
    let mut in_common_prefixes = false;
    let mut seen_root = false;
    let mut current_text = String::with_capacity(256);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_text.clear();
                match e.local_name().as_ref() {
                    b"ListBucketResult" => seen_root = true,
                    b"Contents" => {
                        current_file = Some(File {
                            name: String::new(),
                            last_modified: String::new(),
                            etag: String::new(),
                            size: 0,
                        });
                    }
                    b"CommonPrefixes" => in_common_prefixes = true,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Key" => {
                        if let Some(ref mut file) = current_file {
                            file.name = std::mem::take(&mut current_text);
                        }
                    }
                    b"Size" => {
                        if let Some(ref mut file) = current_file {
                            file.size = current_text.parse().map_err(|_| {
                                OssError::XmlParse(format!("invalid Size {:?}", current_text))
                            })?;
                        }
                    }
                    b"LastModified" => {
                        if let Some(ref mut file) = current_file {
                            file.last_modified = std::mem::take(&mut current_text);
                        }
                    }
                    b"ETag" => {
                        if let Some(ref mut file) = current_file {
                            file.etag = std::mem::take(&mut current_text);
                        }
                    }
                    b"Contents" => {
                        if let Some(file) = current_file.take() {
                            page.files.push(file);
                        }
                    }
                    b"CommonPrefixes" => in_common_prefixes = false,
                    b"Prefix" => {
                        if in_common_prefixes {
                            page.dirs.push(Directory {
                                name: std::mem::take(&mut current_text),
                            });
                        } else if current_file.is_none() {
                            page.prefix = std::mem::take(&mut current_text);
                        }
                    }
                    b"IsTruncated" => page.is_truncated = current_text == "true",
                    b"NextMarker" => page.next_marker = std::mem::take(&mut current_text),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
    }

    if !seen_root {
        return Err(OssError::XmlParse(
            "missing ListBucketResult element".to_string(),
        ));
    }
    Ok(page)
}

/// Parse an `<Error>` document. Returns `None` when the body is not a
/// structured error or carries no message.
pub(crate) fn parse_response_error(body: &[u8]) -> Option<ResponseError> {
    let mut reader = xml_reader(body);
    let mut error = ResponseError::default();
    let mut depth = 0usize;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth == 0 && e.local_name().as_ref() != b"Error" {
                    return None;
                }
                depth += 1;
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape().ok()?);
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    let value = std::mem::take(&mut current_text);
                    match e.local_name().as_ref() {
                        b"Code" => error.code = value,
                        b"Message" => error.message = value,
                        b"RequestId" => error.request_id = value,
                        b"HostId" => error.host_id = value,
                        _ => {}
                    }
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    if error.message.is_empty() {
        None
    } else {
        Some(error)
    }
}

#[derive(Debug, Default, Deserialize)]
struct InfoValue {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ImageInfoBody {
    #[serde(rename = "FileSize", default)]
    size: InfoValue,
    #[serde(rename = "Format", default)]
    format: InfoValue,
    #[serde(rename = "ImageWidth", default)]
    width: InfoValue,
    #[serde(rename = "ImageHeight", default)]
    height: InfoValue,
}

/// Decode the `image/info` JSON document. Numeric fields arrive as strings;
/// missing or non-numeric values decode as zero.
pub(crate) fn parse_image_info(body: &[u8]) -> Result<ImageInfo> {
    let info: ImageInfoBody = serde_json::from_slice(body)?;
    Ok(ImageInfo {
        size: info.size.value.trim().parse().unwrap_or(0),
        format: info.format.value,
        width: info.width.value.trim().parse().unwrap_or(0),
        height: info.height.value.trim().parse().unwrap_or(0),
    })
}
