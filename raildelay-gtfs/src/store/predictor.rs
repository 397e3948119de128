//! persistence for trained regressor pipelines. the pipeline itself is an
//! opaque blob; only its metadata is queryable.

use sqlx::Row;

use raildelay_core::clock::ServiceDay;

use crate::error::ScheduleError;
use crate::store::ScheduleStore;

#[derive(Debug, Clone)]
pub struct PredictorRecord {
    pub id: Option<i64>,
    /// route short name the regressor was trained for
    pub line: String,
    /// ordered feature names the pipeline expects
    pub features: Vec<String>,
    pub training_start: ServiceDay,
    pub training_end: ServiceDay,
    pub version_tag: String,
    pub score_notes: Option<String>,
    /// serialized pipeline, never interpreted here
    pub pipeline: Vec<u8>,
}

impl ScheduleStore {
    pub async fn save_predictor(&self, record: &PredictorRecord) -> Result<i64, ScheduleError> {
        let features = serde_json::to_string(&record.features)
            .map_err(|e| ScheduleError::InvalidArgument(format!("feature list: {e}")))?;
        let row = sqlx::query(
            r#"
            INSERT INTO predictors (line, features, training_start, training_end,
                                    version_tag, score_notes, pipeline)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.line)
        .bind(&features)
        .bind(record.training_start.to_string())
        .bind(record.training_end.to_string())
        .bind(&record.version_tag)
        .bind(&record.score_notes)
        .bind(&record.pipeline)
        .fetch_one(self.pool())
        .await?;
        let id: i64 = row.try_get("id")?;
        log::info!(
            "saved predictor {id} for line {} ({})",
            record.line,
            record.version_tag
        );
        Ok(id)
    }

    /// the most recently saved predictor for a line, if any
    pub async fn latest_predictor(
        &self,
        line: &str,
    ) -> Result<Option<PredictorRecord>, ScheduleError> {
        let row = sqlx::query(
            "SELECT * FROM predictors WHERE line = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(line)
        .fetch_optional(self.pool())
        .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let features_json: String = row.try_get("features")?;
                let features: Vec<String> = serde_json::from_str(&features_json)
                    .map_err(|e| ScheduleError::InvalidArgument(format!("feature list: {e}")))?;
                let start: String = row.try_get("training_start")?;
                let end: String = row.try_get("training_end")?;
                Ok(Some(PredictorRecord {
                    id: Some(row.try_get("id")?),
                    line: row.try_get("line")?,
                    features,
                    training_start: start.parse()?,
                    training_end: end.parse()?,
                    version_tag: row.try_get("version_tag")?,
                    score_notes: row.try_get("score_notes")?,
                    pipeline: row.try_get("pipeline")?,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(version_tag: &str) -> PredictorRecord {
        PredictorRecord {
            id: None,
            line: "C".to_string(),
            features: vec![
                "last_observed_delay".to_string(),
                "line_median_delay".to_string(),
            ],
            training_start: ServiceDay::from_str("20170201").unwrap(),
            training_end: ServiceDay::from_str("20170501").unwrap(),
            version_tag: version_tag.to_string(),
            score_notes: Some("mae 41s on held-out week".to_string()),
            pipeline: vec![1, 2, 3, 4],
        }
    }

    #[tokio::test]
    async fn test_save_and_load_latest() {
        let store = ScheduleStore::in_memory().await.unwrap();
        store.save_predictor(&record("v1")).await.unwrap();
        store.save_predictor(&record("v2")).await.unwrap();

        let latest = store.latest_predictor("C").await.unwrap().unwrap();
        assert_eq!(latest.version_tag, "v2");
        assert_eq!(latest.pipeline, vec![1, 2, 3, 4]);
        assert_eq!(latest.features.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_for_unknown_line_is_none() {
        let store = ScheduleStore::in_memory().await.unwrap();
        assert!(store.latest_predictor("J").await.unwrap().is_none());
    }
}
