use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::dedup::{remove_duplicates_in_batch, DedupedBatch};
use crate::error::CheckerError;
use crate::mas::MasScheduler;
use crate::media::filter_changed_and_new_media;
use crate::metrics_consts::{
    BATCH_PROCESSING_TIME, MEDIA_PUBLISHED, MEDIA_UNCHANGED, PUBLISH_FAILED, RESUBMITTED,
    SPECIMENS_NEW_OR_CHANGED, SPECIMENS_PARTIAL, SPECIMENS_UNCHANGED,
};
use crate::publisher::PublishGateway;
use crate::relationships::{
    linked_media_ids, media_id_map, pair_specimens_with_media, process_media_relationships,
};
use crate::specimens::classify_specimens;
use crate::store::{MediaStore, SpecimenStore};
use crate::types::{MediaRecord, SpecimenEvent, SpecimenRecord};

/// What happened to one batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub unique: usize,
    pub resubmitted: usize,
    pub new_or_changed: usize,
    pub partial: usize,
    pub unchanged: usize,
    pub specimens_published: usize,
    pub media_published: usize,
    pub media_unchanged: usize,
    pub mas_scheduled: usize,
}

pub struct DataChecker {
    specimen_store: Arc<dyn SpecimenStore>,
    media_store: Arc<dyn MediaStore>,
    publisher: Arc<dyn PublishGateway>,
    scheduler: MasScheduler,
    doi_proxy: String,
}

impl DataChecker {
    pub fn new(
        specimen_store: Arc<dyn SpecimenStore>,
        media_store: Arc<dyn MediaStore>,
        publisher: Arc<dyn PublishGateway>,
        agent_id: &str,
        doi_proxy: &str,
    ) -> Self {
        Self {
            specimen_store,
            media_store,
            publisher,
            scheduler: MasScheduler::new(agent_id, doi_proxy),
            doi_proxy: doi_proxy.to_owned(),
        }
    }

    /// Reconciles one delivered batch against the store.
    ///
    /// Only store failures are returned, the batch should then be redelivered.
    /// Duplicates are resubmitted before the store is read, so a redelivered
    /// batch resubmits them again.
    /// Failing to publish a record is logged and the rest of the batch goes on.
    pub async fn handle_batch(
        &self,
        events: Vec<SpecimenEvent>,
    ) -> Result<BatchSummary, CheckerError> {
        if events.is_empty() {
            return Ok(BatchSummary::default());
        }
        let start = Instant::now();

        let DedupedBatch { unique, duplicates } = remove_duplicates_in_batch(&events);
        drop(events);
        let mut summary = BatchSummary {
            unique: unique.len(),
            resubmitted: self.resubmit(&duplicates).await,
            ..Default::default()
        };

        let current_media = self.fetch_current_media(&unique).await?;
        let records = self.fetch_current_specimens(&unique).await?;
        let current_media = self.add_linked_media(current_media, &records).await?;
        let current_specimens = pair_specimens_with_media(records, &current_media, &self.doi_proxy);

        let specimens = classify_specimens(unique, &current_specimens, &current_media);
        let media = filter_changed_and_new_media(&specimens, &current_media);
        summary.new_or_changed = specimens.new_or_changed.len();
        summary.partial = specimens.partial.len();
        summary.unchanged = specimens.unchanged.len();
        summary.media_unchanged = media.unchanged.len();
        metrics::counter!(SPECIMENS_NEW_OR_CHANGED).increment(summary.new_or_changed as u64);
        metrics::counter!(SPECIMENS_PARTIAL).increment(summary.partial as u64);
        metrics::counter!(SPECIMENS_UNCHANGED).increment(summary.unchanged as u64);
        metrics::counter!(MEDIA_UNCHANGED).increment(summary.media_unchanged as u64);

        let unchanged_specimen_ids: Vec<String> = specimens.unchanged.keys().cloned().collect();
        self.specimen_store
            .mark_checked(&unchanged_specimen_ids)
            .await?;
        let unchanged_media_ids: Vec<String> = media
            .unchanged
            .iter()
            .map(|record| record.id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.media_store.mark_checked(&unchanged_media_ids).await?;

        // Built before the buckets are consumed by publishing
        let mut mas_requests = self.scheduler.specimen_requests(&specimens.unchanged);
        mas_requests.extend(
            self.scheduler.media_requests(
                &media.unchanged,
                specimens
                    .unchanged
                    .values()
                    .chain(specimens.partial.iter().map(|partial| &partial.event)),
            ),
        );

        let media_ids = media_id_map(&current_media);
        for event in specimens.new_or_changed {
            let current = current_specimens.get(event.physical_id());
            let event = process_media_relationships(current, event, &media_ids, &self.doi_proxy);
            summary.specimens_published += self.publish_specimen(&event).await;
        }
        for partial in specimens.partial {
            let current = current_specimens.get(partial.event.physical_id());
            let mut event =
                process_media_relationships(current, partial.event, &media_ids, &self.doi_proxy);
            event.media_events = partial.changed_media;
            summary.specimens_published += self.publish_specimen(&event).await;
        }

        for event in &media.new_or_changed {
            match self.publisher.publish_media(event).await {
                Ok(()) => summary.media_published += 1,
                Err(e) => {
                    error!("Failed to publish media {}: {}", event.access_uri(), e);
                    metrics::counter!(PUBLISH_FAILED, "target" => "media").increment(1);
                }
            }
        }
        metrics::counter!(MEDIA_PUBLISHED).increment(summary.media_published as u64);

        summary.mas_scheduled = self
            .scheduler
            .schedule(mas_requests, self.publisher.as_ref())
            .await;

        metrics::histogram!(BATCH_PROCESSING_TIME).record(start.elapsed().as_secs_f64());
        info!("Processed batch: {:?}", summary);
        Ok(summary)
    }

    // Returns how many duplicates made it back onto the input topic
    async fn resubmit(&self, duplicates: &[SpecimenEvent]) -> usize {
        let mut resubmitted = 0;
        for event in duplicates {
            match self.publisher.resubmit(event).await {
                Ok(()) => resubmitted += 1,
                Err(e) => error!(
                    "Failed to resubmit duplicate {}, dropping it: {}",
                    event.physical_id(),
                    e
                ),
            }
        }
        metrics::counter!(RESUBMITTED).increment(resubmitted as u64);
        resubmitted
    }

    async fn fetch_current_media(
        &self,
        events: &[SpecimenEvent],
    ) -> Result<HashMap<String, MediaRecord>, CheckerError> {
        let access_uris: Vec<String> = events
            .iter()
            .flat_map(SpecimenEvent::media_uris)
            .map(str::to_owned)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(self.media_store.fetch_by_access_uris(&access_uris).await?)
    }

    async fn fetch_current_specimens(
        &self,
        events: &[SpecimenEvent],
    ) -> Result<Vec<SpecimenRecord>, CheckerError> {
        let physical_ids: Vec<String> = events
            .iter()
            .map(|event| event.physical_id().to_owned())
            .collect();
        Ok(self
            .specimen_store
            .fetch_by_physical_ids(&physical_ids)
            .await?)
    }

    // Stored specimens can link to media that are no longer in the batch. We
    // need those records too, to tell that the specimen's media set changed.
    async fn add_linked_media(
        &self,
        mut current_media: HashMap<String, MediaRecord>,
        records: &[SpecimenRecord],
    ) -> Result<HashMap<String, MediaRecord>, CheckerError> {
        let missing: Vec<String> = {
            let known: HashSet<&str> = current_media
                .values()
                .map(|record| record.id.as_str())
                .collect();
            records
                .iter()
                .flat_map(|record| linked_media_ids(record, &self.doi_proxy))
                .filter(|id| !known.contains(id))
                .map(str::to_owned)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        if missing.is_empty() {
            return Ok(current_media);
        }

        let linked = self.media_store.fetch_by_ids(&missing).await?;
        if linked.len() < missing.len() {
            warn!(
                "{} linked media could not be found in the store",
                missing.len() - linked.len()
            );
        }
        for record in linked {
            current_media
                .entry(record.access_uri.clone())
                .or_insert(record);
        }
        Ok(current_media)
    }

    async fn publish_specimen(&self, event: &SpecimenEvent) -> usize {
        match self.publisher.publish_specimen(event).await {
            Ok(()) => 1,
            Err(e) => {
                error!("Failed to publish specimen {}: {}", event.physical_id(), e);
                metrics::counter!(PUBLISH_FAILED, "target" => "specimen").increment(1);
                0
            }
        }
    }
}
