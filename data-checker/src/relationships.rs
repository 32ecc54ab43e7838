use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::types::{MediaRecord, Relationship, SpecimenEvent, SpecimenRecord};

/// Persistent media id to access URI, for every media record we know about.
pub fn media_id_map(current_media: &HashMap<String, MediaRecord>) -> HashMap<&str, &str> {
    current_media
        .values()
        .map(|record| (record.id.as_str(), record.access_uri.as_str()))
        .collect()
}

/// Persistent ids of the media a stored specimen links to.
pub fn linked_media_ids<'a>(
    record: &'a SpecimenRecord,
    doi_proxy: &str,
) -> impl Iterator<Item = &'a str> + 'a {
    let doi_proxy = doi_proxy.to_owned();
    record
        .specimen
        .attributes
        .relationships
        .iter()
        .filter(|relationship| relationship.is_media())
        .map(move |relationship| relationship.related_id(&doi_proxy))
}

/// Fills in the media URIs of each stored specimen from its has-media
/// relationships, and keys the result on physical id.
///
/// A relationship pointing at a media id we have no record for cannot be
/// resolved to a URI, it is left out of the set. When two stored specimens
/// share a physical id the first one is kept.
pub fn pair_specimens_with_media(
    records: Vec<SpecimenRecord>,
    current_media: &HashMap<String, MediaRecord>,
    doi_proxy: &str,
) -> HashMap<String, SpecimenRecord> {
    let media_ids = media_id_map(current_media);
    let mut paired: HashMap<String, SpecimenRecord> = HashMap::with_capacity(records.len());
    for record in records {
        if let Some(kept) = paired.get(record.physical_id()) {
            warn!(
                "Specimens {} and {} share physical id {}, ignoring {}",
                kept.id,
                record.id,
                record.physical_id(),
                record.id
            );
            continue;
        }
        let media_uris: BTreeSet<String> = linked_media_ids(&record, doi_proxy)
            .filter_map(|id| {
                let uri = media_ids.get(id);
                if uri.is_none() {
                    warn!(
                        "Specimen {} links to unknown media {}, ignoring it",
                        record.id, id
                    );
                }
                uri.map(|uri| uri.to_string())
            })
            .collect();
        paired.insert(
            record.physical_id().to_owned(),
            SpecimenRecord {
                media_uris,
                ..record
            },
        );
    }
    paired
}

/// Rewrites the stored relationship list of a specimen for republishing.
///
/// Relationships that are not has-media are kept as they are. A has-media
/// relationship is kept only if its media resolves to one of `kept_media_uris`,
/// every other media link is tombstoned.
pub fn remove_tombstoned_relationships(
    current: &SpecimenRecord,
    kept_media_uris: &BTreeSet<&str>,
    media_ids: &HashMap<&str, &str>,
    doi_proxy: &str,
) -> Vec<Relationship> {
    current
        .specimen
        .attributes
        .relationships
        .iter()
        .filter(|relationship| {
            if !relationship.is_media() {
                return true;
            }
            media_ids
                .get(relationship.related_id(doi_proxy))
                .is_some_and(|uri| kept_media_uris.contains(uri))
        })
        .cloned()
        .collect()
}

/// Applies [`remove_tombstoned_relationships`] to an outgoing specimen event,
/// keeping the media of every media event it carries. Must run before the
/// event's media list is narrowed down for publishing.
///
/// New specimens (no stored record) are passed through untouched.
pub fn process_media_relationships(
    current: Option<&SpecimenRecord>,
    mut event: SpecimenEvent,
    media_ids: &HashMap<&str, &str>,
    doi_proxy: &str,
) -> SpecimenEvent {
    if let Some(current) = current {
        let relationships = {
            let kept_media_uris = event.media_uris();
            remove_tombstoned_relationships(current, &kept_media_uris, media_ids, doi_proxy)
        };
        event.specimen.attributes.relationships = relationships;
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        given_media_event, given_media_record, given_relationship, given_specimen_event,
        given_specimen_record, media_by_uri, DOI_PROXY,
    };
    use serde_json::json;

    #[test]
    fn pairing_resolves_media_uris_through_ids() {
        let m1 = given_media_record("20.5000.1025/M1", "u1", json!({}));
        let m2 = given_media_record("20.5000.1025/M2", "u2", json!({}));
        let record = given_specimen_record("S1", "A", json!({}), &[&m1, &m2]);
        let current = media_by_uri(vec![m1, m2]);

        let paired = pair_specimens_with_media(vec![record], &current, DOI_PROXY);

        let expected: BTreeSet<String> = ["u1".to_string(), "u2".to_string()].into();
        assert_eq!(paired["A"].media_uris, expected);
        assert_eq!(paired["A"].id, "S1");
    }

    #[test]
    fn pairing_skips_unknown_media() {
        let m1 = given_media_record("20.5000.1025/M1", "u1", json!({}));
        let gone = given_media_record("20.5000.1025/GONE", "u9", json!({}));
        let record = given_specimen_record("S1", "A", json!({}), &[&m1, &gone]);

        let paired = pair_specimens_with_media(vec![record], &media_by_uri(vec![m1]), DOI_PROXY);

        let expected: BTreeSet<String> = ["u1".to_string()].into();
        assert_eq!(paired["A"].media_uris, expected);
    }

    #[test]
    fn pairing_keeps_the_first_of_a_shared_physical_id() {
        let first = given_specimen_record("S1", "A", json!({"v": 1}), &[]);
        let second = given_specimen_record("S2", "A", json!({"v": 2}), &[]);

        let paired = pair_specimens_with_media(vec![first, second], &HashMap::new(), DOI_PROXY);

        assert_eq!(paired.len(), 1);
        assert_eq!(paired["A"].id, "S1");
    }

    #[test]
    fn media_missing_from_the_event_is_tombstoned() {
        let m1 = given_media_record("20.5000.1025/M1", "u1", json!({}));
        let m2 = given_media_record("20.5000.1025/M2", "u2", json!({}));
        let mut record = given_specimen_record("S1", "A", json!({}), &[&m1, &m2]);
        let collection = given_relationship("hasOrganisationID", "https://ror.org/0443cwa12");
        record
            .specimen
            .attributes
            .relationships
            .push(collection.clone());
        let current = media_by_uri(vec![m1, m2]);
        let media_ids = media_id_map(&current);

        let kept = remove_tombstoned_relationships(
            &record,
            &["u1"].into(),
            &media_ids,
            DOI_PROXY,
        );

        assert_eq!(
            kept,
            vec![
                record.specimen.attributes.relationships[0].clone(),
                collection
            ]
        );
    }

    #[test]
    fn unresolvable_media_link_is_tombstoned() {
        let m1 = given_media_record("20.5000.1025/M1", "u1", json!({}));
        let record = given_specimen_record("S1", "A", json!({}), &[&m1]);

        let kept =
            remove_tombstoned_relationships(&record, &["u1"].into(), &HashMap::new(), DOI_PROXY);

        assert!(kept.is_empty());
    }

    #[test]
    fn new_specimen_relationships_pass_through() {
        let mut event = given_specimen_event("A", json!({}), vec![]);
        event.specimen.attributes.relationships =
            vec![given_relationship("hasDigitalMedia", "https://doi.org/x")];

        let processed =
            process_media_relationships(None, event.clone(), &HashMap::new(), DOI_PROXY);

        assert_eq!(processed, event);
    }

    #[test]
    fn existing_specimen_takes_stored_relationships() {
        let m1 = given_media_record("20.5000.1025/M1", "u1", json!({}));
        let m2 = given_media_record("20.5000.1025/M2", "u2", json!({}));
        let record = given_specimen_record("S1", "A", json!({}), &[&m1, &m2]);
        let mut event = given_specimen_event(
            "A",
            json!({"v": 2}),
            vec![given_media_event("u1", json!({}))],
        );
        event.specimen.attributes.relationships = vec![given_relationship("hasOther", "x")];
        let current = media_by_uri(vec![m1, m2]);
        let media_ids = media_id_map(&current);

        let processed = process_media_relationships(Some(&record), event, &media_ids, DOI_PROXY);

        assert_eq!(
            processed.specimen.attributes.relationships,
            vec![record.specimen.attributes.relationships[0].clone()]
        );
    }
}
