use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::metrics_consts::DUPLICATES_IN_BATCH;
use crate::types::SpecimenEvent;

/// Result of collapsing one delivered batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DedupedBatch {
    /// At most one event per physical id, no access URI claimed twice.
    pub unique: Vec<SpecimenEvent>,
    /// Events to hand back to the input topic for a later batch.
    pub duplicates: Vec<SpecimenEvent>,
}

#[derive(Default)]
struct Accumulator<'a> {
    batch: DedupedBatch,
    claimed_media: HashSet<&'a str>,
}

/// Keeps the first admissible event per physical id, in delivery order.
///
/// An event is admissible when none of its access URIs has been claimed by an
/// event accepted earlier in the batch. Every other member of a physical id
/// group is a duplicate, even when it would have been admissible on its own.
pub fn remove_duplicates_in_batch(events: &[SpecimenEvent]) -> DedupedBatch {
    let groups = group_by_physical_id(events);

    let accumulator = groups
        .into_iter()
        .fold(Accumulator::default(), |mut acc, group| {
            if group.len() > 1 {
                warn!(
                    "Found {} duplicate specimen in batch for id {}",
                    group.len(),
                    group[0].physical_id()
                );
            }

            let mut admitted = false;
            let mut rejected = 0;
            for event in group {
                if admitted {
                    rejected += 1;
                    acc.batch.duplicates.push(event.clone());
                } else if collides(event, &acc.claimed_media) {
                    warn!(
                        "Specimen {} claims media already taken in batch, resubmitting it",
                        event.physical_id()
                    );
                    rejected += 1;
                    acc.batch.duplicates.push(event.clone());
                } else {
                    acc.claimed_media.extend(event.media_uris());
                    acc.batch.unique.push(event.clone());
                    admitted = true;
                }
            }
            if rejected > 0 {
                metrics::counter!(DUPLICATES_IN_BATCH).increment(rejected);
            }
            acc
        });

    accumulator.batch
}

fn collides(event: &SpecimenEvent, claimed: &HashSet<&str>) -> bool {
    event
        .media_events
        .iter()
        .any(|media| claimed.contains(media.access_uri()))
}

// Groups keep the position of the first event of each physical id.
fn group_by_physical_id(events: &[SpecimenEvent]) -> Vec<Vec<&SpecimenEvent>> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(events.len());
    let mut groups: Vec<Vec<&SpecimenEvent>> = Vec::with_capacity(events.len());
    for event in events {
        match positions.get(event.physical_id()) {
            Some(&position) => groups[position].push(event),
            None => {
                positions.insert(event.physical_id(), groups.len());
                groups.push(vec![event]);
            }
        }
    }
    groups
}
