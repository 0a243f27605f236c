//! Firestore REST repository for civic-issue reports.
//!
//! Issues one `runQuery` per fetch:
//! `createdAt >= since ORDER BY createdAt DESC LIMIT n` on the configured
//! collection, then decodes Firestore's typed value encoding into `Report`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use super::auth::LazyCloudSession;
use super::{apply_window, ReportSource, ReportWindow, StoreError};
use crate::models::{Location, Report};

pub struct FirestoreReportRepository {
    session: Arc<LazyCloudSession>,
    collection: String,
}

impl FirestoreReportRepository {
    pub fn new(session: Arc<LazyCloudSession>, collection: impl Into<String>) -> Self {
        Self {
            session,
            collection: collection.into(),
        }
    }

    fn build_query(&self, window: &ReportWindow, limit: usize) -> serde_json::Value {
        json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "createdAt" },
                        "op": "GREATER_THAN_OR_EQUAL",
                        "value": {
                            "timestampValue": window.since.to_rfc3339_opts(SecondsFormat::Millis, true)
                        }
                    }
                },
                "orderBy": [{
                    "field": { "fieldPath": "createdAt" },
                    "direction": "DESCENDING"
                }],
                "limit": limit
            }
        })
    }
}

#[async_trait]
impl ReportSource for FirestoreReportRepository {
    async fn fetch_window(
        &self,
        window: &ReportWindow,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let session = self.session.get().await?;
        let token = session.tokens.bearer().await?;
        let url = format!("{}:runQuery", session.firestore_base);

        let response = session
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&self.build_query(window, limit))
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<RunQueryRow> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let reports = rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(decode_report)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            collection = %self.collection,
            count = reports.len(),
            since = %window.since,
            "Fetched reports"
        );

        Ok(apply_window(reports, window, limit))
    }
}

// ═══════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RunQueryRow {
    document: Option<Document>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
    create_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
enum Value {
    NullValue(serde_json::Value),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(serde_json::Value),
    MapValue(MapValue),
}

#[derive(Debug, Deserialize)]
struct GeoPoint {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
struct MapValue {
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl Value {
    fn as_str(&self) -> Option<&str> {
        match self {
            Value::StringValue(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::DoubleValue(d) => Some(*d),
            Value::IntegerValue(i) => i.parse().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

fn decode_location(value: &Value) -> Option<Location> {
    match value {
        Value::MapValue(map) => Some(Location {
            address: map.fields.get("address").and_then(Value::as_str).map(str::to_string),
            latitude: map.fields.get("latitude").and_then(Value::as_f64),
            longitude: map.fields.get("longitude").and_then(Value::as_f64),
        }),
        Value::GeoPointValue(point) => Some(Location {
            address: None,
            latitude: Some(point.latitude),
            longitude: Some(point.longitude),
        }),
        _ => None,
    }
}

fn decode_report(doc: Document) -> Result<Report, StoreError> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let fields = &doc.fields;
    let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

    let created_at = match fields.get("createdAt") {
        Some(Value::TimestampValue(raw)) => parse_timestamp(raw)?,
        _ => match &doc.create_time {
            Some(raw) => parse_timestamp(raw)?,
            None => return Err(StoreError::Decode(format!("report {id} has no createdAt"))),
        },
    };

    let flags: BTreeMap<String, bool> = match fields.get("flags") {
        Some(Value::MapValue(map)) => map
            .fields
            .iter()
            .filter_map(|(who, v)| v.as_bool().map(|b| (who.clone(), b)))
            .collect(),
        _ => BTreeMap::new(),
    };

    let flag_count = fields
        .get("flagCount")
        .and_then(Value::as_f64)
        .map(|n| n.max(0.0) as u32);

    let mut report = Report {
        description: text("description").unwrap_or_default(),
        category: text("category"),
        status: text("status"),
        location: fields.get("location").and_then(decode_location),
        flag_count: flag_count.unwrap_or(0),
        flags,
        created_at,
        user_id: text("userId"),
        image_url: text("imageUrl"),
        id,
    };
    // Older documents carry the flag map without the counter.
    if flag_count.is_none() {
        report.flag_count = report.active_flaggers() as u32;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use chrono::Duration;
    use std::path::PathBuf;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repository_for(server: &MockServer) -> FirestoreReportRepository {
        let config = StoreConfig {
            service_account_path: PathBuf::from("unused.json"),
            project_id: Some("civic-test".into()),
            collection: "reports".into(),
            emulator_host: Some(server.address().to_string()),
        };
        let session = Arc::new(LazyCloudSession::new(config, reqwest::Client::new()));
        FirestoreReportRepository::new(session, "reports")
    }

    fn doc(id: &str, created_at: DateTime<Utc>, extra: serde_json::Value) -> serde_json::Value {
        let mut fields = json!({
            "description": { "stringValue": format!("Report {id}") },
            "createdAt": { "timestampValue": created_at.to_rfc3339() },
        });
        if let (Some(base), Some(more)) = (fields.as_object_mut(), extra.as_object()) {
            for (k, v) in more {
                base.insert(k.clone(), v.clone());
            }
        }
        json!({
            "document": {
                "name": format!("projects/civic-test/databases/(default)/documents/reports/{id}"),
                "fields": fields,
                "createTime": created_at.to_rfc3339(),
            },
            "readTime": Utc::now().to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn decodes_full_report() {
        let server = MockServer::start().await;
        let now = Utc::now();
        let body = json!([doc(
            "abc123",
            now - Duration::hours(2),
            json!({
                "category": { "stringValue": "Roads" },
                "status": { "nullValue": null },
                "flagCount": { "integerValue": "4" },
                "flags": { "mapValue": { "fields": {
                    "u1": { "booleanValue": true },
                    "u2": { "booleanValue": false }
                }}},
                "location": { "mapValue": { "fields": {
                    "address": { "stringValue": "5 Elm St" },
                    "latitude": { "doubleValue": 6.52 },
                    "longitude": { "integerValue": "3" }
                }}},
                "userId": { "stringValue": "u1" }
            })
        )]);

        Mock::given(method("POST"))
            .and(path_regex(r"/v1/projects/civic-test/databases/.*/documents:runQuery$"))
            .and(header("authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let repo = repository_for(&server);
        let reports = repo.fetch_within_window(2, 50).await.unwrap();

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.id, "abc123");
        assert_eq!(report.category.as_deref(), Some("Roads"));
        assert_eq!(report.status, None);
        assert_eq!(report.status_label(), "Pending");
        assert_eq!(report.flag_count, 4);
        assert_eq!(report.active_flaggers(), 1);
        let location = report.location.as_ref().unwrap();
        assert_eq!(location.address.as_deref(), Some("5 Elm St"));
        assert_eq!(location.longitude, Some(3.0));
        assert_eq!(report.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn missing_flag_count_uses_raised_flags() {
        let server = MockServer::start().await;
        let body = json!([doc(
            "legacy",
            Utc::now() - Duration::hours(1),
            json!({
                "flags": { "mapValue": { "fields": {
                    "u1": { "booleanValue": true },
                    "u2": { "booleanValue": true },
                    "u3": { "booleanValue": false }
                }}}
            })
        )]);

        Mock::given(method("POST"))
            .and(path_regex(r":runQuery$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let reports = repository_for(&server).fetch_within_window(1, 10).await.unwrap();
        assert_eq!(reports[0].flag_count, 2);
    }

    #[tokio::test]
    async fn skips_rows_without_documents_and_orders_newest_first() {
        let server = MockServer::start().await;
        let now = Utc::now();
        let body = json!([
            doc("older", now - Duration::hours(5), json!({})),
            doc("newer", now - Duration::hours(1), json!({})),
            { "readTime": now.to_rfc3339() }
        ]);

        Mock::given(method("POST"))
            .and(path_regex(r":runQuery$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let reports = repository_for(&server).fetch_within_window(1, 10).await.unwrap();
        let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn store_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":runQuery$"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let err = repository_for(&server).fetch_within_window(2, 10).await.unwrap_err();
        match err {
            StoreError::Status { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_limit_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let reports = repository_for(&server).fetch_within_window(2, 0).await.unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let session = Arc::new(LazyCloudSession::new(
            StoreConfig {
                service_account_path: PathBuf::from("unused.json"),
                project_id: None,
                collection: "reports".into(),
                emulator_host: None,
            },
            reqwest::Client::new(),
        ));
        let repo = FirestoreReportRepository::new(session, "reports");
        let window = ReportWindow::trailing_days(2, Utc::now());
        let query = repo.build_query(&window, 25);

        let q = &query["structuredQuery"];
        assert_eq!(q["from"][0]["collectionId"], "reports");
        assert_eq!(q["where"]["fieldFilter"]["op"], "GREATER_THAN_OR_EQUAL");
        assert_eq!(q["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(q["limit"], 25);
    }

    #[test]
    fn missing_created_at_falls_back_to_create_time() {
        let doc = Document {
            name: "projects/p/databases/(default)/documents/reports/r9".into(),
            fields: HashMap::new(),
            create_time: Some("2026-03-01T10:00:00Z".into()),
        };
        let report = decode_report(doc).unwrap();
        assert_eq!(report.id, "r9");
        assert_eq!(report.created_at.to_rfc3339(), "2026-03-01T10:00:00+00:00");
        assert_eq!(report.description, "");
    }
}
