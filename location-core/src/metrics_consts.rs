pub const PASS_STARTS: &str = "location_consolidation_pass_starts";
pub const PASS_ENDS: &str = "location_consolidation_pass_ends";
pub const PASS_SKIPPED: &str = "location_consolidation_pass_skipped";
pub const PASS_FAILURES: &str = "location_consolidation_pass_failures";
pub const PASS_TIME: &str = "location_consolidation_pass_duration_seconds";

pub const VEHICLES_PROCESSED: &str = "location_consolidation_vehicles";
pub const EVENTS_CONSOLIDATED: &str = "location_consolidation_events";
pub const HISTORIES_CREATED: &str = "location_consolidation_histories_created";
pub const HISTORIES_EXTENDED: &str = "location_consolidation_histories_extended";
pub const BATCHES_DROPPED: &str = "location_consolidation_batches_dropped";
pub const EVENTS_TRUNCATED: &str = "location_consolidation_events_truncated";
