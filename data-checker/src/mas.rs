use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, error};

use crate::metrics_consts::{MAS_SCHEDULED, PUBLISH_FAILED};
use crate::publisher::PublishGateway;
use crate::types::{MasJobRequest, MediaEvent, MediaRecord, MjrTargetType, SpecimenEvent};

/// Builds annotation job requests for records that need no reprocessing but
/// asked for scheduling anyway.
#[derive(Clone, Debug)]
pub struct MasScheduler {
    agent_id: String,
    doi_proxy: String,
}

impl MasScheduler {
    pub fn new(agent_id: &str, doi_proxy: &str) -> Self {
        Self {
            agent_id: agent_id.to_owned(),
            doi_proxy: doi_proxy.to_owned(),
        }
    }

    /// One request per mas of every unchanged specimen that forces scheduling.
    /// `unchanged` is keyed on the stored record id.
    pub fn specimen_requests(
        &self,
        unchanged: &BTreeMap<String, SpecimenEvent>,
    ) -> BTreeSet<MasJobRequest> {
        unchanged
            .iter()
            .filter(|(_, event)| event.force_mas_schedule)
            .flat_map(|(id, event)| self.requests(id, &event.mas_list, MjrTargetType::Specimen))
            .collect()
    }

    /// Same for unchanged media. The stored record carries no scheduling
    /// flags, so each one is matched with the incoming media event of the
    /// same access URI.
    pub fn media_requests<'a>(
        &self,
        unchanged: &[MediaRecord],
        specimens: impl IntoIterator<Item = &'a SpecimenEvent>,
    ) -> BTreeSet<MasJobRequest> {
        let events: HashMap<&str, &MediaEvent> = specimens
            .into_iter()
            .flat_map(|specimen| specimen.media_events.iter())
            .map(|event| (event.access_uri(), event))
            .collect();

        unchanged
            .iter()
            .filter_map(|record| {
                events
                    .get(record.access_uri.as_str())
                    .map(|event| (record, *event))
            })
            .filter(|(_, event)| event.force_mas_schedule)
            .flat_map(|(record, event)| {
                self.requests(&record.id, &event.mas_list, MjrTargetType::Media)
            })
            .collect()
    }

    fn requests<'a>(
        &'a self,
        id: &'a str,
        mas_list: &'a BTreeSet<String>,
        target_type: MjrTargetType,
    ) -> impl Iterator<Item = MasJobRequest> + 'a {
        mas_list.iter().map(move |mas_id| MasJobRequest {
            mas_id: mas_id.clone(),
            target_id: format!("{}{}", self.doi_proxy, id),
            batching: false,
            agent_id: self.agent_id.clone(),
            target_type,
        })
    }

    /// Sends every request on its own. A failed request is logged and does
    /// not stop the rest. Returns how many were delivered.
    pub async fn schedule(
        &self,
        requests: BTreeSet<MasJobRequest>,
        publisher: &dyn PublishGateway,
    ) -> usize {
        let mut scheduled = 0;
        for request in &requests {
            match publisher.publish_mas_job_request(request).await {
                Ok(()) => {
                    debug!(
                        "Scheduled mas {} for {}",
                        request.mas_id, request.target_id
                    );
                    scheduled += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to schedule mas {} for {}: {}",
                        request.mas_id, request.target_id, e
                    );
                    metrics::counter!(PUBLISH_FAILED, "target" => "mas").increment(1);
                }
            }
        }
        metrics::counter!(MAS_SCHEDULED).increment(scheduled as u64);
        scheduled
    }
}
