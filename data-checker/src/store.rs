use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::types::{MediaRecord, SpecimenAttributes, SpecimenRecord, SpecimenWrapper};

#[async_trait]
pub trait SpecimenStore: Send + Sync {
    /// Stored specimens for the given physical ids. `media_uris` is left empty,
    /// it is resolved when pairing with the stored media.
    async fn fetch_by_physical_ids(
        &self,
        physical_ids: &[String],
    ) -> Result<Vec<SpecimenRecord>, StoreError>;

    async fn mark_checked(&self, ids: &[String]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stored media for the given access URIs, keyed on access URI.
    async fn fetch_by_access_uris(
        &self,
        access_uris: &[String],
    ) -> Result<HashMap<String, MediaRecord>, StoreError>;

    /// Stored media for the given persistent ids.
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<MediaRecord>, StoreError>;

    async fn mark_checked(&self, ids: &[String]) -> Result<(), StoreError>;
}

#[derive(FromRow)]
struct SpecimenRow {
    id: String,
    physical_specimen_id: String,
    #[sqlx(rename = "type")]
    specimen_type: String,
    data: Value,
    original_data: Value,
}

impl TryFrom<SpecimenRow> for SpecimenRecord {
    type Error = StoreError;

    fn try_from(row: SpecimenRow) -> Result<Self, Self::Error> {
        let attributes: SpecimenAttributes =
            serde_json::from_value(row.data).map_err(|error| StoreError::MappingError {
                id: row.id.clone(),
                error,
            })?;

        Ok(SpecimenRecord {
            id: row.id,
            specimen: SpecimenWrapper {
                physical_specimen_id: row.physical_specimen_id,
                specimen_type: row.specimen_type,
                attributes,
                original_attributes: row.original_data,
            },
            media_uris: Default::default(),
        })
    }
}

#[derive(FromRow)]
struct MediaRow {
    id: String,
    media_url: String,
    data: Value,
    original_data: Value,
}

impl From<MediaRow> for MediaRecord {
    fn from(row: MediaRow) -> Self {
        MediaRecord {
            id: row.id,
            access_uri: row.media_url,
            attributes: row.data,
            original_attributes: row.original_data,
        }
    }
}

pub struct PgSpecimenStore {
    pool: PgPool,
}

impl PgSpecimenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpecimenStore for PgSpecimenStore {
    async fn fetch_by_physical_ids(
        &self,
        physical_ids: &[String],
    ) -> Result<Vec<SpecimenRecord>, StoreError> {
        if physical_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<SpecimenRow> = sqlx::query_as(
            r#"
SELECT id, physical_specimen_id, type, data, original_data
FROM digital_specimen
WHERE physical_specimen_id = ANY($1)
            "#,
        )
        .bind(physical_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })?;

        rows.into_iter().map(SpecimenRecord::try_from).collect()
    }

    async fn mark_checked(&self, ids: &[String]) -> Result<(), StoreError> {
        mark_checked(&self.pool, "digital_specimen", ids).await
    }
}

pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(
        &self,
        column: &str,
        values: &[String],
    ) -> Result<Vec<MediaRecord>, StoreError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
SELECT id, media_url, data, original_data
FROM digital_media_object
WHERE {column} = ANY($1)
            "#
        );
        let rows: Vec<MediaRow> = sqlx::query_as(&query)
            .bind(values)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT".to_owned(),
                error,
            })?;

        Ok(rows.into_iter().map(MediaRecord::from).collect())
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn fetch_by_access_uris(
        &self,
        access_uris: &[String],
    ) -> Result<HashMap<String, MediaRecord>, StoreError> {
        let records = self.fetch_where("media_url", access_uris).await?;
        Ok(records
            .into_iter()
            .map(|record| (record.access_uri.clone(), record))
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<MediaRecord>, StoreError> {
        self.fetch_where("id", ids).await
    }

    async fn mark_checked(&self, ids: &[String]) -> Result<(), StoreError> {
        mark_checked(&self.pool, "digital_media_object", ids).await
    }
}

async fn mark_checked(pool: &PgPool, table: &str, ids: &[String]) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }

    let query = format!("UPDATE {table} SET last_checked = $1 WHERE id = ANY($2)");
    sqlx::query(&query)
        .bind(Utc::now())
        .bind(ids)
        .execute(pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    async fn insert_specimen(db: &PgPool, id: &str, physical_id: &str, data: Value) {
        sqlx::query(
            "INSERT INTO digital_specimen (id, physical_specimen_id, type, data, original_data) VALUES ($1, $2, 'type', $3, $4)",
        )
        .bind(id)
        .bind(physical_id)
        .bind(data)
        .bind(json!({"abcd:unitID": physical_id}))
        .execute(db)
        .await
        .expect("failed to insert specimen");
    }

    async fn insert_media(db: &PgPool, id: &str, uri: &str) {
        sqlx::query(
            "INSERT INTO digital_media_object (id, media_url, type, data, original_data) VALUES ($1, $2, 'type', $3, $4)",
        )
        .bind(id)
        .bind(uri)
        .bind(json!({"ac:accessURI": uri}))
        .bind(json!({"ac:accessURI": uri}))
        .execute(db)
        .await
        .expect("failed to insert media");
    }

    fn specimen_row(data: Value) -> SpecimenRow {
        SpecimenRow {
            id: "20.5000.1025/S1".to_string(),
            physical_specimen_id: "A".to_string(),
            specimen_type: "type".to_string(),
            data,
            original_data: json!({"abcd:unitID": "A"}),
        }
    }

    #[test]
    fn test_malformed_relationships_fail_mapping() {
        let result =
            SpecimenRecord::try_from(specimen_row(json!({"ods:hasEntityRelationships": "x"})));

        assert!(matches!(result, Err(StoreError::MappingError { id, .. }) if id == "20.5000.1025/S1"));
    }

    #[test]
    fn test_missing_relationships_map_to_empty() {
        let record =
            SpecimenRecord::try_from(specimen_row(json!({"dwc:basisOfRecord": "PreservedSpecimen"})))
                .expect("failed to map specimen row");

        assert!(record.specimen.attributes.relationships.is_empty());
        assert_eq!(record.specimen.physical_specimen_id, "A");
        assert_eq!(record.specimen.original_attributes, json!({"abcd:unitID": "A"}));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_fetch_specimens_by_physical_id(db: PgPool) {
        insert_specimen(
            &db,
            "20.5000.1025/S1",
            "A",
            json!({
                "dwc:basisOfRecord": "PreservedSpecimen",
                "ods:hasEntityRelationships": [{
                    "dwc:relationshipOfResource": "hasDigitalMedia",
                    "dwc:relatedResourceID": "https://doi.org/20.5000.1025/M1"
                }]
            }),
        )
        .await;
        insert_specimen(&db, "20.5000.1025/S2", "B", json!({})).await;
        let store = PgSpecimenStore::new(db);

        let records = store
            .fetch_by_physical_ids(&["A".to_string(), "C".to_string()])
            .await
            .expect("failed to fetch specimens");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "20.5000.1025/S1");
        assert_eq!(records[0].specimen.attributes.relationships.len(), 1);
        assert_eq!(
            records[0].specimen.original_attributes,
            json!({"abcd:unitID": "A"})
        );
        assert!(records[0].media_uris.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_malformed_specimen_data_is_an_error(db: PgPool) {
        insert_specimen(
            &db,
            "20.5000.1025/S1",
            "A",
            json!({"ods:hasEntityRelationships": "not-a-list"}),
        )
        .await;
        let store = PgSpecimenStore::new(db);

        let result = store.fetch_by_physical_ids(&["A".to_string()]).await;

        assert!(matches!(result, Err(StoreError::MappingError { id, .. }) if id == "20.5000.1025/S1"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_fetch_media_by_uri_and_id(db: PgPool) {
        insert_media(&db, "20.5000.1025/M1", "https://media/1.jpg").await;
        insert_media(&db, "20.5000.1025/M2", "https://media/2.jpg").await;
        let store = PgMediaStore::new(db);

        let by_uri = store
            .fetch_by_access_uris(&["https://media/1.jpg".to_string()])
            .await
            .expect("failed to fetch media");
        let by_id = store
            .fetch_by_ids(&["20.5000.1025/M2".to_string()])
            .await
            .expect("failed to fetch media");

        assert_eq!(by_uri.len(), 1);
        assert_eq!(by_uri["https://media/1.jpg"].id, "20.5000.1025/M1");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].access_uri, "https://media/2.jpg");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_mark_checked_sets_timestamp(db: PgPool) {
        insert_specimen(&db, "20.5000.1025/S1", "A", json!({})).await;
        insert_specimen(&db, "20.5000.1025/S2", "B", json!({})).await;
        let store = PgSpecimenStore::new(db.clone());

        store
            .mark_checked(&["20.5000.1025/S1".to_string()])
            .await
            .expect("failed to mark checked");
        store.mark_checked(&[]).await.expect("empty update failed");

        let checked: Vec<(String, Option<DateTime<Utc>>)> =
            sqlx::query_as("SELECT id, last_checked FROM digital_specimen ORDER BY id")
                .fetch_all(&db)
                .await
                .expect("failed to read back");

        assert!(checked[0].1.is_some());
        assert!(checked[1].1.is_none());
    }
}
