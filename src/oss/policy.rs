//! Browser upload policies (POST object form fields)
//!
//! A policy document lists the conditions an upload must meet and when the
//! permission expires. It is JSON-encoded, base64-encoded and signed with the
//! account secret; a browser then posts the file to the bucket together with
//! the returned fields.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::oss::client::Client;
use crate::oss::error::{OssError, Result};

/// Validity used when no duration is given
pub const DEFAULT_POLICY_DURATION: Duration = Duration::from_secs(10 * 60);

/// One clause of a policy's `conditions` list
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyCondition {
    /// `{"<field>": "<value>"}`
    Equals { field: String, value: String },
    /// `["starts-with", "$<field>", "<prefix>"]`
    StartsWith { field: String, prefix: String },
    /// `["content-length-range", min, max]`
    ContentLengthRange { min: u64, max: u64 },
    /// Passed through as-is; must be a JSON object or array
    Raw(Value),
}

impl PolicyCondition {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        PolicyCondition::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        PolicyCondition::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    fn to_json(&self) -> Result<Value> {
        match self {
            PolicyCondition::Equals { field, value } => {
                let mut clause = serde_json::Map::new();
                clause.insert(field.clone(), Value::String(value.clone()));
                Ok(Value::Object(clause))
            }
            PolicyCondition::StartsWith { field, prefix } => {
                let field = if field.starts_with('$') {
                    field.clone()
                } else {
                    format!("${}", field)
                };
                Ok(json!(["starts-with", field, prefix]))
            }
            PolicyCondition::ContentLengthRange { min, max } => {
                if min > max {
                    return Err(OssError::Policy(format!(
                        "content-length-range minimum {} exceeds maximum {}",
                        min, max
                    )));
                }
                Ok(json!(["content-length-range", min, max]))
            }
            PolicyCondition::Raw(value) => match value {
                Value::Object(_) | Value::Array(_) => Ok(value.clone()),
                other => Err(OssError::Policy(format!(
                    "condition must be a JSON object or array, got {}",
                    other
                ))),
            },
        }
    }
}

#[derive(Serialize)]
struct PolicyDocument {
    expiration: String,
    conditions: Vec<Value>,
}

/// Builder for a signed upload policy
#[derive(Debug, Clone)]
pub struct PostPolicy {
    key: String,
    max_size: u64,
    duration: Duration,
    conditions: Vec<PolicyCondition>,
}

impl PostPolicy {
    /// Policy for uploading to `key` (a leading `/` is dropped)
    pub fn new(key: &str) -> Self {
        Self {
            key: key.strip_prefix('/').unwrap_or(key).to_string(),
            max_size: 0,
            duration: DEFAULT_POLICY_DURATION,
            conditions: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Largest accepted upload in bytes; 0 leaves the size unlimited
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// How long the policy stays valid; zero selects the default
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = if duration.is_zero() {
            DEFAULT_POLICY_DURATION
        } else {
            duration
        };
        self
    }

    /// Append caller conditions after the built-in ones
    pub fn conditions(mut self, conditions: impl IntoIterator<Item = PolicyCondition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// JSON policy document for `bucket`, expiring `duration` after `now`
    /// (rounded to whole seconds)
    pub fn document(&self, bucket: &str, now: DateTime<Utc>) -> Result<String> {
        let duration = TimeDelta::from_std(self.duration)
            .map_err(|e| OssError::Policy(format!("duration out of range: {}", e)))?;
        let expiration = now
            .round_subsecs(0)
            .checked_add_signed(duration)
            .ok_or_else(|| OssError::Policy("expiration out of range".to_string()))?;

        let mut conditions = vec![json!({ "bucket": bucket }), json!({ "key": self.key })];
        if self.max_size > 0 {
            conditions.push(json!(["content-length-range", 0, self.max_size]));
        }
        for condition in &self.conditions {
            conditions.push(condition.to_json()?);
        }

        let document = PolicyDocument {
            expiration: expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
            conditions,
        };
        Ok(serde_json::to_string(&document)?)
    }

    /// Signed form fields: `key`, `policy`, `OSSAccessKeyId`, `signature`
    pub fn form_fields(&self, client: &Client) -> Result<BTreeMap<String, String>> {
        let document = self.document(client.bucket(), Utc::now())?;
        let policy = BASE64.encode(document);
        let signature = client.signer().sign_policy(&policy);

        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), self.key.clone());
        fields.insert("policy".to_string(), policy);
        fields.insert("OSSAccessKeyId".to_string(), client.access_key_id().to_string());
        fields.insert("signature".to_string(), signature);
        Ok(fields)
    }
}
