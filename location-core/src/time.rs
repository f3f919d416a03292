pub trait TimeSource {
    // Return the current time as milliseconds since the unix epoch
    fn now_ms(&self) -> i64;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now_ms(&self) -> i64 {
        let now = time::OffsetDateTime::now_utc();

        // Milliseconds only leave i64 some 292 million years from now.
        i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }
}

/// A clock stuck at a given instant, for tests and replays.
#[derive(Clone, Copy)]
pub struct FixedTime {
    now_ms: i64,
}

impl FixedTime {
    pub fn new(now_ms: i64) -> Self {
        Self { now_ms }
    }
}

impl TimeSource for FixedTime {
    fn now_ms(&self) -> i64 {
        self.now_ms
    }
}
