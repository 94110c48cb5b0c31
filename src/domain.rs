use url::Url;

use crate::error::SubmitError;

/// Canonical dedup key for a scraped site: the URL's host, lowercased.
pub fn normalize(raw: &str) -> Result<String, SubmitError> {
    let parsed = Url::parse(raw.trim()).map_err(|_| SubmitError::InvalidUrl(raw.to_string()))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SubmitError::InvalidUrl(raw.to_string()))?;
    Ok(host.to_lowercase())
}
