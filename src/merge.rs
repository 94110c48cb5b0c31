use std::collections::HashSet;
use std::hash::Hash;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::db::WebsiteRecord;
use crate::domain;
use crate::error::SubmitError;

/// One inbound scrape payload. Fields stay loosely typed so that wrong shapes
/// can be coerced (arrays) or reported (sourceUrl, emails) instead of failing
/// at deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub source_url: Option<Value>,
    #[serde(default)]
    pub phone: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub other_links: Option<Value>,
    #[serde(default)]
    pub saved_at: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub record: WebsiteRecord,
    pub is_new: bool,
}

/// Build the document to persist for `sub`, merging into `existing` when the
/// domain already has a record. Validation runs before anything is built.
pub fn upsert(
    sub: &Submission,
    existing: Option<&WebsiteRecord>,
    now: DateTime<Utc>,
) -> Result<Upserted, SubmitError> {
    let source_url = required_source_url(sub)?.trim().to_string();
    let domain = domain::normalize(&source_url)?;
    let emails = email_entries(sub.email.as_ref())?;
    let phones = phone_entries(sub.phone.as_ref());
    let links = as_array(sub.other_links.as_ref()).to_vec();
    let saved_at = resolve_saved_at(sub.saved_at.as_ref(), now);

    let upserted = match existing {
        None => Upserted {
            record: WebsiteRecord {
                id: None,
                domain,
                source_url,
                phone: union_by(&[], &phones, String::clone),
                email: union_by(&[], &emails, String::clone),
                other_links: union_by(&[], &links, link_key),
                saved_at,
                created_at: now,
                updated_at: now,
            },
            is_new: true,
        },
        Some(prev) => Upserted {
            record: WebsiteRecord {
                id: prev.id,
                domain: prev.domain.clone(),
                source_url,
                phone: union_by(&prev.phone, &phones, String::clone),
                email: union_by(&prev.email, &emails, String::clone),
                other_links: union_by(&prev.other_links, &links, link_key),
                saved_at,
                created_at: prev.created_at,
                updated_at: now,
            },
            is_new: false,
        },
    };
    Ok(upserted)
}

/// The domain a submission targets; the store lookup key.
pub fn dedup_key(sub: &Submission) -> Result<String, SubmitError> {
    domain::normalize(required_source_url(sub)?)
}

fn required_source_url(sub: &Submission) -> Result<&str, SubmitError> {
    match &sub.source_url {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => Err(SubmitError::MissingField("sourceUrl")),
    }
}

/// Ordered union: `existing` first in its order, then unseen `incoming`
/// entries in their order. First occurrence of a key wins.
fn union_by<T, K, F>(existing: &[T], incoming: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(existing.len() + incoming.len());
    for item in existing.iter().chain(incoming) {
        if seen.insert(key(item)) {
            out.push(item.clone());
        }
    }
    out
}

/// Identity of a link entry: the string itself, the `url`/`href` field of an
/// object, or the canonical JSON text of anything else.
pub fn link_key(link: &Value) -> String {
    match link {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("href"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| link.to_string()),
        other => other.to_string(),
    }
}

fn as_array(v: Option<&Value>) -> &[Value] {
    match v {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

fn phone_entries(v: Option<&Value>) -> Vec<String> {
    as_array(v)
        .iter()
        .filter_map(|p| match p {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn email_entries(v: Option<&Value>) -> Result<Vec<String>, SubmitError> {
    as_array(v)
        .iter()
        .map(|e| match e {
            Value::String(s) if is_valid_email(s) => Ok(s.clone()),
            Value::String(s) => Err(SubmitError::InvalidEmail(s.clone())),
            other => Err(SubmitError::InvalidEmail(other.to_string())),
        })
        .collect()
}

pub fn is_valid_email(val: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
    re.is_match(val)
}

fn resolve_saved_at(v: Option<&Value>, now: DateTime<Utc>) -> DateTime<Utc> {
    match v {
        Some(Value::String(s)) => parse_timestamp(s).unwrap_or(now),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(now),
        _ => now,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Zone-less date-times are read as UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
