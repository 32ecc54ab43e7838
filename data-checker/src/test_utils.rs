use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use common_kafka::kafka_producer::KafkaProduceError;
use serde_json::{json, Map, Value};

use crate::error::{PublishError, StoreError};
use crate::publisher::PublishGateway;
use crate::store::{MediaStore, SpecimenStore};
use crate::types::{
    MasJobRequest, MediaAttributes, MediaEvent, MediaRecord, MediaWrapper, Relationship,
    SpecimenAttributes, SpecimenEvent, SpecimenRecord, SpecimenWrapper, HAS_MEDIA,
};

pub const DOI_PROXY: &str = "https://doi.org/";
pub const APP_PID: &str = "https://doi.org/10.5281/to-do";

const SPECIMEN_TYPE: &str = "https://doi.org/21.T11148/894b1e6cad57e921764e";
const MEDIA_TYPE: &str = "https://doi.org/21.T11148/bbad8c4e101e8af01115";

pub fn given_specimen_event(
    physical_id: &str,
    original_attributes: Value,
    media_events: Vec<MediaEvent>,
) -> SpecimenEvent {
    SpecimenEvent {
        mas_list: BTreeSet::new(),
        specimen: SpecimenWrapper {
            physical_specimen_id: physical_id.to_owned(),
            specimen_type: SPECIMEN_TYPE.to_owned(),
            attributes: SpecimenAttributes {
                relationships: Vec::new(),
                other: attribute_map(json!({"dwc:basisOfRecord": "PreservedSpecimen"})),
            },
            original_attributes,
        },
        media_events,
        force_mas_schedule: false,
        is_data_from_source_system: true,
    }
}

pub fn given_media_event(access_uri: &str, original_attributes: Value) -> MediaEvent {
    MediaEvent {
        mas_list: BTreeSet::new(),
        media: MediaWrapper {
            media_type: MEDIA_TYPE.to_owned(),
            attributes: MediaAttributes {
                access_uri: access_uri.to_owned(),
                other: Map::new(),
            },
            original_attributes,
        },
        force_mas_schedule: false,
    }
}

pub fn given_media_record(id: &str, access_uri: &str, original_attributes: Value) -> MediaRecord {
    MediaRecord {
        id: id.to_owned(),
        access_uri: access_uri.to_owned(),
        attributes: json!({"ac:accessURI": access_uri}),
        original_attributes,
    }
}

pub fn given_relationship(relationship_type: &str, related_resource_id: &str) -> Relationship {
    Relationship {
        relationship_type: relationship_type.to_owned(),
        related_resource_id: related_resource_id.to_owned(),
        related_resource_uri: Some(related_resource_id.to_owned()),
        other: Map::new(),
    }
}

/// A stored specimen with a has-media relationship to each of `media`, and its
/// media URIs already resolved.
pub fn given_specimen_record(
    id: &str,
    physical_id: &str,
    original_attributes: Value,
    media: &[&MediaRecord],
) -> SpecimenRecord {
    let event = given_specimen_event(physical_id, original_attributes, Vec::new());
    let mut specimen = event.specimen;
    specimen.attributes.relationships = media
        .iter()
        .map(|record| given_relationship(HAS_MEDIA, &format!("{DOI_PROXY}{}", record.id)))
        .collect();

    SpecimenRecord {
        id: id.to_owned(),
        specimen,
        media_uris: media
            .iter()
            .map(|record| record.access_uri.clone())
            .collect(),
    }
}

pub fn media_by_uri(records: Vec<MediaRecord>) -> HashMap<String, MediaRecord> {
    records
        .into_iter()
        .map(|record| (record.access_uri.clone(), record))
        .collect()
}

fn attribute_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn unavailable() -> StoreError {
    StoreError::QueryError {
        command: "SELECT".to_owned(),
        error: sqlx::Error::PoolTimedOut,
    }
}

/// Serves stored specimens from memory and records every id marked checked.
#[derive(Default)]
pub struct InMemorySpecimenStore {
    records: Vec<SpecimenRecord>,
    checked: Mutex<Vec<String>>,
    unavailable: bool,
}

impl InMemorySpecimenStore {
    pub fn new(records: Vec<SpecimenRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    /// A store whose every call fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn checked(&self) -> Vec<String> {
        lock(&self.checked).clone()
    }
}

#[async_trait]
impl SpecimenStore for InMemorySpecimenStore {
    async fn fetch_by_physical_ids(
        &self,
        physical_ids: &[String],
    ) -> Result<Vec<SpecimenRecord>, StoreError> {
        if self.unavailable {
            return Err(unavailable());
        }
        // Like the real store, media URIs are left for pairing to resolve
        Ok(self
            .records
            .iter()
            .filter(|record| physical_ids.iter().any(|id| id == record.physical_id()))
            .map(|record| SpecimenRecord {
                media_uris: BTreeSet::new(),
                ..record.clone()
            })
            .collect())
    }

    async fn mark_checked(&self, ids: &[String]) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(unavailable());
        }
        lock(&self.checked).extend(ids.iter().cloned());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMediaStore {
    records: Vec<MediaRecord>,
    checked: Mutex<Vec<String>>,
}

impl InMemoryMediaStore {
    pub fn new(records: Vec<MediaRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn checked(&self) -> Vec<String> {
        lock(&self.checked).clone()
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn fetch_by_access_uris(
        &self,
        access_uris: &[String],
    ) -> Result<HashMap<String, MediaRecord>, StoreError> {
        Ok(media_by_uri(
            self.records
                .iter()
                .filter(|record| access_uris.contains(&record.access_uri))
                .cloned()
                .collect(),
        ))
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<MediaRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|record| ids.contains(&record.id))
            .cloned()
            .collect())
    }

    async fn mark_checked(&self, ids: &[String]) -> Result<(), StoreError> {
        lock(&self.checked).extend(ids.iter().cloned());
        Ok(())
    }
}

/// Keeps every successfully published record. Failures can be injected per
/// physical id, access URI or mas id.
#[derive(Default)]
pub struct RecordingPublisher {
    specimens: Mutex<Vec<SpecimenEvent>>,
    media: Mutex<Vec<MediaEvent>>,
    resubmitted: Mutex<Vec<SpecimenEvent>>,
    mas_requests: Mutex<Vec<MasJobRequest>>,
    dead_letters: Mutex<Vec<String>>,
    failing_keys: HashSet<String>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_owned());
        self
    }

    pub fn specimens(&self) -> Vec<SpecimenEvent> {
        lock(&self.specimens).clone()
    }

    pub fn media(&self) -> Vec<MediaEvent> {
        lock(&self.media).clone()
    }

    pub fn resubmitted(&self) -> Vec<SpecimenEvent> {
        lock(&self.resubmitted).clone()
    }

    pub fn mas_requests(&self) -> Vec<MasJobRequest> {
        lock(&self.mas_requests).clone()
    }

    pub fn dead_letters(&self) -> Vec<String> {
        lock(&self.dead_letters).clone()
    }

    fn check(&self, topic: &str, key: &str) -> Result<(), PublishError> {
        if self.failing_keys.contains(key) {
            return Err(PublishError::DeliveryError {
                topic: topic.to_owned(),
                error: KafkaProduceError::KafkaProduceCanceled,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PublishGateway for RecordingPublisher {
    async fn publish_specimen(&self, event: &SpecimenEvent) -> Result<(), PublishError> {
        self.check("digital-specimen", event.physical_id())?;
        lock(&self.specimens).push(event.clone());
        Ok(())
    }

    async fn publish_media(&self, event: &MediaEvent) -> Result<(), PublishError> {
        self.check("digital-media", event.access_uri())?;
        lock(&self.media).push(event.clone());
        Ok(())
    }

    async fn resubmit(&self, event: &SpecimenEvent) -> Result<(), PublishError> {
        self.check("source-system-data-checker", event.physical_id())?;
        lock(&self.resubmitted).push(event.clone());
        Ok(())
    }

    async fn publish_mas_job_request(&self, request: &MasJobRequest) -> Result<(), PublishError> {
        self.check("mas-scheduler", &request.mas_id)?;
        lock(&self.mas_requests).push(request.clone());
        Ok(())
    }

    async fn dead_letter_raw(&self, payload: &str) -> Result<(), PublishError> {
        self.check("source-system-data-checker-dlq", payload)?;
        lock(&self.dead_letters).push(payload.to_owned());
        Ok(())
    }
}
