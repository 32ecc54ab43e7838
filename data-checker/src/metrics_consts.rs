pub const EVENTS_RECEIVED: &str = "data_checker_events_received_total";
pub const EVENT_PARSE_ERROR: &str = "data_checker_event_parse_error_total";
pub const EMPTY_EVENTS: &str = "data_checker_empty_events_total";
pub const DEAD_LETTERED: &str = "data_checker_dead_lettered_total";
pub const DUPLICATES_IN_BATCH: &str = "data_checker_duplicates_in_batch_total";
pub const RESUBMITTED: &str = "data_checker_resubmitted_total";
pub const PUBLISH_FAILED: &str = "data_checker_publish_failed_total";
pub const SPECIMENS_NEW_OR_CHANGED: &str = "data_checker_specimens_new_or_changed_total";
pub const SPECIMENS_PARTIAL: &str = "data_checker_specimens_partial_total";
pub const SPECIMENS_UNCHANGED: &str = "data_checker_specimens_unchanged_total";
pub const MEDIA_PUBLISHED: &str = "data_checker_media_published_total";
pub const MEDIA_UNCHANGED: &str = "data_checker_media_unchanged_total";
pub const MAS_SCHEDULED: &str = "data_checker_mas_scheduled_total";
pub const BATCH_PROCESSING_TIME: &str = "data_checker_batch_processing_time_seconds";
