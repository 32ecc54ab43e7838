use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Relationship type linking a specimen to one of its media objects. It is the
/// only relationship type this service looks into.
pub const HAS_MEDIA: &str = "hasDigitalMedia";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "dwc:relationshipOfResource", default)]
    pub relationship_type: String,
    #[serde(rename = "dwc:relatedResourceID", default)]
    pub related_resource_id: String,
    #[serde(
        rename = "ods:relatedResourceURI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub related_resource_uri: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Relationship {
    pub fn is_media(&self) -> bool {
        self.relationship_type == HAS_MEDIA
    }

    /// The persistent id of the related resource, without the resolver prefix.
    pub fn related_id<'a>(&'a self, doi_proxy: &str) -> &'a str {
        self.related_resource_id
            .strip_prefix(doi_proxy)
            .unwrap_or(&self.related_resource_id)
    }
}

/// Normalised specimen attributes. Only the relationship list is interpreted,
/// everything else is carried through as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecimenAttributes {
    #[serde(
        rename = "ods:hasEntityRelationships",
        default,
        deserialize_with = "null_as_default"
    )]
    pub relationships: Vec<Relationship>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecimenWrapper {
    #[serde(rename = "ods:normalisedPhysicalSpecimenID")]
    pub physical_specimen_id: String,
    #[serde(rename = "ods:type", default)]
    pub specimen_type: String,
    #[serde(rename = "ods:attributes", default)]
    pub attributes: SpecimenAttributes,
    // The change signal, compared as-is against the stored version
    #[serde(rename = "ods:originalAttributes", default)]
    pub original_attributes: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttributes {
    #[serde(rename = "ac:accessURI")]
    pub access_uri: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaWrapper {
    #[serde(rename = "ods:type", default)]
    pub media_type: String,
    #[serde(rename = "ods:attributes")]
    pub attributes: MediaAttributes,
    #[serde(rename = "ods:originalAttributes", default)]
    pub original_attributes: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub mas_list: BTreeSet<String>,
    #[serde(rename = "digitalMedia")]
    pub media: MediaWrapper,
    #[serde(default, deserialize_with = "null_as_default")]
    pub force_mas_schedule: bool,
}

impl MediaEvent {
    pub fn access_uri(&self) -> &str {
        &self.media.attributes.access_uri
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecimenEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub mas_list: BTreeSet<String>,
    #[serde(rename = "digitalSpecimenWrapper")]
    pub specimen: SpecimenWrapper,
    #[serde(
        rename = "digitalMediaEvents",
        default,
        deserialize_with = "null_as_default"
    )]
    pub media_events: Vec<MediaEvent>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub force_mas_schedule: bool,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub is_data_from_source_system: bool,
}

impl SpecimenEvent {
    pub fn physical_id(&self) -> &str {
        &self.specimen.physical_specimen_id
    }

    pub fn media_uris(&self) -> BTreeSet<&str> {
        self.media_events.iter().map(MediaEvent::access_uri).collect()
    }
}

/// The stored version of a specimen. `media_uris` is never read from the store
/// itself, it is resolved from the stored has-media relationships.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecimenRecord {
    pub id: String,
    pub specimen: SpecimenWrapper,
    pub media_uris: BTreeSet<String>,
}

impl SpecimenRecord {
    pub fn physical_id(&self) -> &str {
        &self.specimen.physical_specimen_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRecord {
    pub id: String,
    pub access_uri: String,
    pub attributes: Value,
    pub original_attributes: Value,
}

/// A changed specimen that still has some unchanged media. It gets republished
/// carrying only `changed_media`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecimenWithFilteredMedia {
    pub event: SpecimenEvent,
    pub changed_media: Vec<MediaEvent>,
    pub unchanged_media: Vec<MediaRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredSpecimens {
    pub new_or_changed: Vec<SpecimenEvent>,
    pub partial: Vec<SpecimenWithFilteredMedia>,
    /// Keyed on the stored record id.
    pub unchanged: BTreeMap<String, SpecimenEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredMedia {
    pub new_or_changed: Vec<MediaEvent>,
    pub unchanged: Vec<MediaRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MjrTargetType {
    #[serde(rename = "DIGITAL_SPECIMEN")]
    Specimen,
    #[serde(rename = "DIGITAL_MEDIA")]
    Media,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasJobRequest {
    pub mas_id: String,
    pub target_id: String,
    pub batching: bool,
    pub agent_id: String,
    pub target_type: MjrTargetType,
}

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_and_null_fields_get_defaults() {
        let event: SpecimenEvent = serde_json::from_value(json!({
            "masList": null,
            "digitalSpecimenWrapper": {
                "ods:normalisedPhysicalSpecimenID": "https://geocollections.info/specimen/23602",
                "ods:type": "https://doi.org/21.T11148/894b1e6cad57e921764e",
                "ods:attributes": {"dwc:basisOfRecord": "FossilSpecimen"},
                "ods:originalAttributes": {"abcd:unitID": "23602"}
            },
            "digitalMediaEvents": null,
            "isDataFromSourceSystem": null
        }))
        .unwrap();

        assert!(event.mas_list.is_empty());
        assert!(event.media_events.is_empty());
        assert!(!event.force_mas_schedule);
        assert!(event.is_data_from_source_system);
        assert!(event.specimen.attributes.relationships.is_empty());
        assert_eq!(
            event.physical_id(),
            "https://geocollections.info/specimen/23602"
        );
    }

    #[test]
    fn unknown_attributes_survive_serialization() {
        let source = json!({
            "ods:normalisedPhysicalSpecimenID": "specimen-1",
            "ods:type": "type",
            "ods:attributes": {
                "dwc:basisOfRecord": "PreservedSpecimen",
                "ods:hasEntityRelationships": [{
                    "dwc:relationshipOfResource": "hasDigitalMedia",
                    "dwc:relatedResourceID": "https://doi.org/20.5000.1025/AAA-111-BBB",
                    "ods:relatedResourceURI": "https://doi.org/20.5000.1025/AAA-111-BBB",
                    "dwc:relationshipAccordingTo": "dissco"
                }]
            },
            "ods:originalAttributes": {"a": 1}
        });
        let wrapper: SpecimenWrapper = serde_json::from_value(source.clone()).unwrap();

        assert_eq!(wrapper.attributes.relationships.len(), 1);
        assert!(wrapper.attributes.relationships[0].is_media());
        assert_eq!(serde_json::to_value(&wrapper).unwrap(), source);
    }

    #[test]
    fn related_id_strips_resolver() {
        let relationship: Relationship = serde_json::from_value(json!({
            "dwc:relationshipOfResource": "hasDigitalMedia",
            "dwc:relatedResourceID": "https://doi.org/20.5000.1025/AAA-111-BBB"
        }))
        .unwrap();

        assert_eq!(
            relationship.related_id("https://doi.org/"),
            "20.5000.1025/AAA-111-BBB"
        );
        assert_eq!(
            relationship.related_id("https://hdl.handle.net/"),
            "https://doi.org/20.5000.1025/AAA-111-BBB"
        );
    }

    #[test]
    fn mas_job_request_wire_format() {
        let request = MasJobRequest {
            mas_id: "mas-1".to_string(),
            target_id: "https://doi.org/20.5000.1025/ABC-123-XYZ".to_string(),
            batching: false,
            agent_id: "https://doi.org/10.5281/to-do".to_string(),
            target_type: MjrTargetType::Media,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "masId": "mas-1",
                "targetId": "https://doi.org/20.5000.1025/ABC-123-XYZ",
                "batching": false,
                "agentId": "https://doi.org/10.5281/to-do",
                "targetType": "DIGITAL_MEDIA"
            })
        );
    }
}
