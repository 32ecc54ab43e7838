use std::collections::HashMap;

use crate::media::split_media;
use crate::types::{
    FilteredSpecimens, MediaRecord, SpecimenEvent, SpecimenRecord, SpecimenWithFilteredMedia,
};

/// A stored specimen is changed when its original attributes differ, or when
/// the event links to a different set of media than the stored relationships.
pub fn specimen_is_changed(event: &SpecimenEvent, record: &SpecimenRecord) -> bool {
    event.specimen.original_attributes != record.specimen.original_attributes
        || !event
            .media_uris()
            .into_iter()
            .eq(record.media_uris.iter().map(String::as_str))
}

/// Sorts deduplicated events into new-or-changed, partial and unchanged.
///
/// `current_specimens` is keyed on physical id with media URIs resolved,
/// `current_media` on access URI. A changed specimen is only republished
/// whole when none of its media is unchanged, otherwise its media are split
/// so that the unchanged ones are left alone.
pub fn classify_specimens(
    events: Vec<SpecimenEvent>,
    current_specimens: &HashMap<String, SpecimenRecord>,
    current_media: &HashMap<String, MediaRecord>,
) -> FilteredSpecimens {
    events
        .into_iter()
        .fold(FilteredSpecimens::default(), |mut filtered, event| {
            match current_specimens.get(event.physical_id()) {
                None => filtered.new_or_changed.push(event),
                Some(record) if !specimen_is_changed(&event, record) => {
                    filtered.unchanged.insert(record.id.clone(), event);
                }
                Some(_) => {
                    let media = split_media(&event.media_events, current_media);
                    if media.unchanged.is_empty() {
                        filtered.new_or_changed.push(event);
                    } else {
                        filtered.partial.push(SpecimenWithFilteredMedia {
                            event,
                            changed_media: media.new_or_changed,
                            unchanged_media: media.unchanged,
                        });
                    }
                }
            }
            filtered
        })
}
