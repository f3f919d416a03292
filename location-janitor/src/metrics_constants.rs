pub const LOOP_TICKS: &str = "location_janitor_loop_ticks";

// Depth of the raw log once a pass is over
pub const RAW_LOG_DEPTH: &str = "location_janitor_raw_events_pending";
