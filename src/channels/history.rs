use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    options::{ClientOptions, FindOptions},
    Client, Collection, Database, IndexModel,
};
use tracing::{debug, info, warn};

use crate::models::{Alert, AlertType};

const DB_NAME: &str = "weather_alerts_db";
const COLLECTION: &str = "weather_alerts";
const DEFAULT_LIMIT: i64 = 100;

/// Optional filters for [`HistoryStore::get_alert_history`]. Date bounds
/// apply to the alert `timestamp`.
#[derive(Debug, Default, Clone)]
pub struct HistoryFilter {
    pub garden_id: Option<String>,
    pub user_id: Option<i64>,
    pub alert_type: Option<AlertType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Append-only alert archive on MongoDB.
///
/// Connecting is best-effort: when the database is unreachable at startup
/// the store degrades to a no-op that logs, returns `false` from writes and
/// `[]` from queries, and never raises.
pub struct HistoryStore {
    database: Option<Database>,
    collection: Option<Collection<Document>>,
}

impl HistoryStore {
    /// Connect and ensure indexes. Never fails: an unreachable endpoint or
    /// missing URL yields a degraded store.
    pub async fn connect(mongo_url: Option<&str>) -> Self {
        let Some(url) = mongo_url else {
            warn!("MONGO_URL not set, alert history disabled");
            return Self::disabled();
        };
        match Self::try_connect(url).await {
            Ok((database, collection)) => {
                info!(db = DB_NAME, collection = COLLECTION, "Alert history store ready");
                Self {
                    database: Some(database),
                    collection: Some(collection),
                }
            }
            Err(e) => {
                warn!(error = %e, "Alert history store unreachable, continuing without it");
                Self::disabled()
            }
        }
    }

    fn disabled() -> Self {
        Self {
            database: None,
            collection: None,
        }
    }

    async fn try_connect(url: &str) -> anyhow::Result<(Database, Collection<Document>)> {
        let mut options = ClientOptions::parse(url).await?;
        options.server_selection_timeout = Some(std::time::Duration::from_secs(5));
        let client = Client::with_options(options)?;
        let database = client.database(DB_NAME);
        database.run_command(doc! {"ping": 1}, None).await?;

        let collection = database.collection::<Document>(COLLECTION);
        // Index creation is best-effort; queries still work unindexed.
        for keys in [
            doc! {"gardenId": 1, "timestamp": -1},
            doc! {"userId": 1, "timestamp": -1},
            doc! {"timestamp": -1},
        ] {
            let model = IndexModel::builder().keys(keys.clone()).build();
            if let Err(e) = collection.create_index(model, None).await {
                warn!(keys = %keys, error = %e, "Failed to create history index");
            }
        }
        Ok((database, collection))
    }

    #[allow(dead_code)]
    pub fn is_ready(&self) -> bool {
        self.collection.is_some()
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> anyhow::Result<()> {
        match &self.database {
            Some(db) => {
                db.run_command(doc! {"ping": 1}, None).await?;
                Ok(())
            }
            None => anyhow::bail!("history store not connected"),
        }
    }

    /// Persist one alert with a server-assigned `createdAt`. Returns whether
    /// the write happened; failures are logged, never raised.
    pub async fn save_alert(&self, alert: &Alert) -> bool {
        let Some(collection) = &self.collection else {
            debug!(alert_id = %alert.alert_id, "History store not ready, skipping persist");
            return false;
        };
        let mut document = match alert_to_document(alert) {
            Ok(d) => d,
            Err(e) => {
                warn!(alert_id = %alert.alert_id, error = %e, "Failed to encode alert document");
                return false;
            }
        };
        document.insert("createdAt", BsonDateTime::now());

        match collection.insert_one(document, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!(alert_id = %alert.alert_id, error = %e, "Failed to persist alert");
                false
            }
        }
    }

    /// Query the archive, newest first, capped at `limit` (default 100).
    /// Returns `[]` when degraded or on any query error.
    pub async fn get_alert_history(&self, filter: &HistoryFilter, limit: Option<i64>) -> Vec<Alert> {
        let Some(collection) = &self.collection else {
            return Vec::new();
        };

        let query = build_query(filter);
        let options = FindOptions::builder()
            .sort(doc! {"timestamp": -1})
            .limit(limit.unwrap_or(DEFAULT_LIMIT))
            .build();

        let mut cursor = match collection.find(query, options).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Alert history query failed");
                return Vec::new();
            }
        };

        let mut alerts = Vec::new();
        loop {
            match cursor.advance().await {
                Ok(true) => match cursor.deserialize_current() {
                    Ok(document) => match document_to_alert(document) {
                        Ok(alert) => alerts.push(alert),
                        Err(e) => warn!(error = %e, "Skipping undecodable history document"),
                    },
                    Err(e) => warn!(error = %e, "Skipping unreadable history document"),
                },
                Ok(false) => break,
                Err(e) => {
                    warn!(error = %e, "Alert history cursor failed");
                    break;
                }
            }
        }
        alerts
    }
}

/// Encode an alert, storing `timestamp` as a native BSON date so range
/// filters and the descending sort compare chronologically.
fn alert_to_document(alert: &Alert) -> anyhow::Result<Document> {
    let mut document = mongodb::bson::to_document(alert)?;
    document.insert("timestamp", BsonDateTime::from_chrono(alert.timestamp));
    Ok(document)
}

fn document_to_alert(mut document: Document) -> anyhow::Result<Alert> {
    if let Some(Bson::DateTime(ts)) = document.get("timestamp").cloned() {
        document.insert("timestamp", ts.to_chrono().to_rfc3339());
    }
    Ok(mongodb::bson::from_document(document)?)
}

fn build_query(filter: &HistoryFilter) -> Document {
    let mut query = Document::new();
    if let Some(garden_id) = &filter.garden_id {
        query.insert("gardenId", garden_id.as_str());
    }
    if let Some(user_id) = filter.user_id {
        query.insert("userId", user_id);
    }
    if let Some(alert_type) = filter.alert_type {
        query.insert("alertType", alert_type.as_str());
    }
    let mut range = Document::new();
    if let Some(start) = filter.start_date {
        range.insert("$gte", BsonDateTime::from_chrono(start));
    }
    if let Some(end) = filter.end_date {
        range.insert("$lte", BsonDateTime::from_chrono(end));
    }
    if !range.is_empty() {
        query.insert("timestamp", range);
    }
    query
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::AlertMetric;

    fn alert() -> Alert {
        Alert {
            alert_id: "1-abc".into(),
            garden_id: "g1".into(),
            user_id: 1,
            garden_name: "G1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 8, 2, 10, 0, 0).unwrap(),
            alert_type: AlertType::StrongWind,
            metric: AlertMetric::WindSpeed,
            current_value: 60.0,
            threshold: 50.0,
            affected_plant_types: vec!["tomato".into()],
            affected_plant_names: vec!["T1".into()],
        }
    }

    #[tokio::test]
    async fn degraded_store_noops() {
        let store = HistoryStore::disabled();
        assert!(!store.is_ready());
        assert!(!store.save_alert(&alert()).await);
        assert!(store
            .get_alert_history(&HistoryFilter::default(), None)
            .await
            .is_empty());
        assert!(store.ping().await.is_err());
    }

    #[test]
    fn alert_document_round_trips() {
        let original = alert();
        let document = alert_to_document(&original).unwrap();
        assert!(matches!(document.get("timestamp"), Some(Bson::DateTime(_))));

        let decoded = document_to_alert(document).unwrap();
        assert_eq!(decoded.alert_id, original.alert_id);
        assert_eq!(decoded.timestamp, original.timestamp);
        assert_eq!(decoded.alert_type, original.alert_type);
        assert_eq!(decoded.affected_plant_names, original.affected_plant_names);
    }

    #[test]
    fn query_includes_only_present_filters() {
        let query = build_query(&HistoryFilter {
            garden_id: Some("g1".into()),
            alert_type: Some(AlertType::HeavyRain),
            ..Default::default()
        });
        assert_eq!(query.get_str("gardenId").unwrap(), "g1");
        assert_eq!(query.get_str("alertType").unwrap(), "HEAVY_RAIN");
        assert!(!query.contains_key("userId"));
        assert!(!query.contains_key("timestamp"));
    }

    #[test]
    fn date_bounds_build_a_timestamp_range() {
        let start = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 2, 0, 0, 0).unwrap();
        let query = build_query(&HistoryFilter {
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        });
        let range = query.get_document("timestamp").unwrap();
        assert!(range.contains_key("$gte"));
        assert!(range.contains_key("$lte"));
    }
}
