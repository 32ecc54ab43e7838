use std::collections::HashMap;

use crate::types::{FilteredMedia, FilteredSpecimens, MediaEvent, MediaRecord};

/// A media event is new or changed when nothing is stored under its access
/// URI, or when its original attributes differ from the stored ones.
pub fn media_is_changed(event: &MediaEvent, current: Option<&MediaRecord>) -> bool {
    match current {
        None => true,
        Some(record) => event.media.original_attributes != record.original_attributes,
    }
}

/// Splits media events into new-or-changed events and the stored records of
/// the unchanged ones.
pub fn split_media<'a>(
    events: impl IntoIterator<Item = &'a MediaEvent>,
    current_media: &HashMap<String, MediaRecord>,
) -> FilteredMedia {
    events
        .into_iter()
        .fold(FilteredMedia::default(), |mut filtered, event| {
            let current = current_media.get(event.access_uri());
            match current {
                Some(record) if !media_is_changed(event, current) => {
                    filtered.unchanged.push(record.clone())
                }
                _ => filtered.new_or_changed.push(event.clone()),
            }
            filtered
        })
}

/// Media that need handling on their own, outside of a full specimen publish.
///
/// Media of unchanged specimens are split here. Specimens in the partial
/// bucket were split while classifying: their unchanged media are added to
/// the unchanged set, their changed media stay attached to the specimen.
/// Media of new-or-changed specimens travel with their specimen.
pub fn filter_changed_and_new_media(
    specimens: &FilteredSpecimens,
    current_media: &HashMap<String, MediaRecord>,
) -> FilteredMedia {
    let mut filtered = split_media(
        specimens
            .unchanged
            .values()
            .flat_map(|event| event.media_events.iter()),
        current_media,
    );
    filtered.unchanged.extend(
        specimens
            .partial
            .iter()
            .flat_map(|specimen| specimen.unchanged_media.iter().cloned()),
    );
    filtered
}
