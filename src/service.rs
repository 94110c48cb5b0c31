use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::{self, Stats, WebsiteRecord};
use crate::error::ApiError;
use crate::merge::{self, Submission, Upserted};

/// A stored record plus derived counters, the shape every endpoint returns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteView {
    #[serde(flatten)]
    pub record: WebsiteRecord,
    pub total_phones: usize,
    pub total_emails: usize,
    pub total_links: usize,
}

impl From<WebsiteRecord> for WebsiteView {
    fn from(record: WebsiteRecord) -> Self {
        WebsiteView {
            total_phones: record.phone.len(),
            total_emails: record.email.len(),
            total_links: record.other_links.len(),
            record,
        }
    }
}

#[derive(Debug)]
pub struct Submitted {
    pub created: bool,
    pub record: WebsiteRecord,
}

/// Lookup, merge and write for one submission inside a single transaction.
/// Validation errors return before anything is written.
pub fn submit(
    conn: &mut Connection,
    sub: &Submission,
    now: DateTime<Utc>,
) -> Result<Submitted, ApiError> {
    let domain = merge::dedup_key(sub)?;
    let tx = conn.transaction()?;
    let existing = db::find_by_domain(&tx, &domain)?;
    let Upserted { mut record, is_new } = merge::upsert(sub, existing.as_ref(), now)?;

    if is_new {
        record.id = Some(db::insert_record(&tx, &record)?);
    } else {
        db::replace_record(&tx, &record)?;
    }
    tx.commit()?;

    if is_new {
        info!(domain = %record.domain, id = ?record.id, "Created website");
    } else {
        debug!(
            domain = %record.domain,
            phones = record.phone.len(),
            emails = record.email.len(),
            links = record.other_links.len(),
            "Merged website"
        );
    }
    Ok(Submitted {
        created: is_new,
        record,
    })
}

pub fn list(conn: &Connection) -> Result<Vec<WebsiteRecord>, ApiError> {
    Ok(db::fetch_all(conn)?)
}

pub fn show(conn: &Connection, id: i64) -> Result<WebsiteRecord, ApiError> {
    db::find_by_id(conn, id)?.ok_or(ApiError::NotFound(id))
}

pub fn stats(conn: &Connection) -> Result<Stats, ApiError> {
    Ok(db::get_stats(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubmitError;
    use chrono::{Duration, TimeZone};
    use serde_json::{json, Value};

    fn sub(v: Value) -> Submission {
        serde_json::from_value(v).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn create_then_merge_same_domain() {
        let mut conn = db::open_in_memory();
        let first = submit(
            &mut conn,
            &sub(json!({"sourceUrl": "http://a.com/x", "phone": ["1"], "email": ["a@a.com"]})),
            t0(),
        )
        .unwrap();
        assert!(first.created);
        let id = first.record.id.unwrap();

        let later = t0() + Duration::hours(1);
        let second = submit(
            &mut conn,
            &sub(json!({"sourceUrl": "https://a.com/y", "phone": ["1", "2"], "email": ["b@b.com"]})),
            later,
        )
        .unwrap();
        assert!(!second.created);
        assert_eq!(second.record.id, Some(id));

        let stored = show(&conn, id).unwrap();
        assert_eq!(stored.phone, vec!["1", "2"]);
        assert_eq!(stored.email, vec!["a@a.com", "b@b.com"]);
        assert_eq!(stored.source_url, "https://a.com/y");
        assert_eq!(stored.created_at, t0());
        assert_eq!(stored.updated_at, later);
        assert_eq!(list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn rejected_submission_writes_nothing() {
        let mut conn = db::open_in_memory();
        let err = submit(
            &mut conn,
            &sub(json!({"sourceUrl": "http://a.com", "email": ["not-an-email"]})),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Invalid(SubmitError::InvalidEmail(_))));
        assert!(list(&conn).unwrap().is_empty());

        submit(&mut conn, &sub(json!({"sourceUrl": "http://a.com", "phone": ["1"]})), t0()).unwrap();
        let before = list(&conn).unwrap();
        let err = submit(
            &mut conn,
            &sub(json!({"sourceUrl": "http://a.com/2", "phone": ["2"], "email": ["bad"]})),
            t0() + Duration::days(1),
        )
        .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(list(&conn).unwrap(), before);
    }

    #[test]
    fn missing_source_url() {
        let mut conn = db::open_in_memory();
        let err = submit(&mut conn, &sub(json!({"phone": ["1"]})), t0()).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Invalid(SubmitError::MissingField("sourceUrl"))
        ));
    }

    #[test]
    fn show_unknown_id() {
        let conn = db::open_in_memory();
        assert!(matches!(show(&conn, 42), Err(ApiError::NotFound(42))));
    }

    #[test]
    fn view_counts_and_shape() {
        let mut conn = db::open_in_memory();
        let done = submit(
            &mut conn,
            &sub(json!({
                "sourceUrl": "http://a.com",
                "phone": ["1", "2"],
                "otherLinks": [{"url": "https://a.com/jobs"}]
            })),
            t0(),
        )
        .unwrap();
        let v = serde_json::to_value(WebsiteView::from(done.record)).unwrap();
        assert_eq!(v["domain"], "a.com");
        assert_eq!(v["sourceUrl"], "http://a.com");
        assert_eq!(v["totalPhones"], 2);
        assert_eq!(v["totalEmails"], 0);
        assert_eq!(v["totalLinks"], 1);
        assert!(v["id"].is_i64());
        assert!(v.get("createdAt").is_some());
    }

    #[test]
    fn stats_sum_arrays() {
        let mut conn = db::open_in_memory();
        submit(&mut conn, &sub(json!({"sourceUrl": "http://a.com", "phone": ["1", "2"]})), t0()).unwrap();
        submit(&mut conn, &sub(json!({"sourceUrl": "http://b.com", "email": ["x@b.com"]})), t0()).unwrap();
        let s = stats(&conn).unwrap();
        assert_eq!((s.websites, s.phones, s.emails, s.links), (2, 2, 1, 0));
    }
}
