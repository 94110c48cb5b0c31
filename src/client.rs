use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug)]
pub struct SubmitStats {
    pub total: usize,
    pub created: usize,
    pub merged: usize,
    pub rejected: usize,
}

/// A payload file holds one submission object or an array of them.
pub fn read_payloads(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    parse_payloads(&raw).with_context(|| format!("Failed to parse {:?}", path))
}

fn parse_payloads(raw: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => Ok(items),
        obj @ Value::Object(_) => Ok(vec![obj]),
        other => bail!("Expected a JSON object or array, got {}", other),
    }
}

/// POST each payload to a running server. Rejections are counted and logged;
/// transport and server errors abort the run.
pub async fn submit_all(server: &str, payloads: Vec<Value>) -> Result<SubmitStats> {
    let client = reqwest::Client::new();
    let endpoint = format!("{}/api/users", server.trim_end_matches('/'));
    let mut stats = SubmitStats {
        total: payloads.len(),
        created: 0,
        merged: 0,
        rejected: 0,
    };

    for payload in payloads {
        let resp = client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", endpoint))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Malformed response from {} ({})", endpoint, status))?;

        match status.as_u16() {
            201 => stats.created += 1,
            200 => stats.merged += 1,
            400 => {
                stats.rejected += 1;
                let source = payload.get("sourceUrl").and_then(Value::as_str).unwrap_or("?");
                warn!(
                    "Rejected {}: {}",
                    source,
                    body["error"].as_str().unwrap_or("unknown error")
                );
                continue;
            }
            _ => bail!(
                "Server error {}: {}",
                status,
                body["error"].as_str().unwrap_or("unknown error")
            ),
        }
        info!(
            "Saved {} ({} phones, {} emails, {} links)",
            body["website"]["domain"].as_str().unwrap_or("?"),
            body["website"]["totalPhones"],
            body["website"]["totalEmails"],
            body["website"]["totalLinks"],
        );
    }

    Ok(stats)
}
