//! Progress reconciliation and duration estimates.
//!
//! The estimate is a display heuristic, not a contract. All constants below
//! are tunable without affecting any other behavior.

use std::time::Duration;

/// Fixed overhead of any search (auth, planning, response assembly).
pub const ESTIMATE_BASE_SECS: f64 = 6.0;
/// Added per selected region.
pub const ESTIMATE_PER_REGION_SECS: f64 = 2.5;
/// Added per started 30-day window of the date range.
pub const ESTIMATE_PER_MONTH_SECS: f64 = 3.0;
/// Regions fetched concurrently by the server; beyond this, time scales by batch.
pub const ESTIMATE_REGIONS_PER_BATCH: usize = 5;
/// Extra time per additional batch.
pub const ESTIMATE_PER_BATCH_SECS: f64 = 4.0;
pub const ESTIMATE_MAX_SECS: f64 = 180.0;

/// Simulated progress approaches but never reaches this value.
pub const SIMULATED_CEILING: f64 = 95.0;

/// Expected duration of a search over `region_count` regions and `days` days.
pub fn estimate_duration(region_count: usize, days: u32) -> Duration {
    let regions = region_count.max(1);
    let months = days.max(1).div_ceil(30);
    let extra_batches = (regions - 1) / ESTIMATE_REGIONS_PER_BATCH;
    let secs = ESTIMATE_BASE_SECS
        + ESTIMATE_PER_REGION_SECS * regions as f64
        + ESTIMATE_PER_MONTH_SECS * f64::from(months)
        + ESTIMATE_PER_BATCH_SECS * extra_batches as f64;
    Duration::from_secs_f64(secs.min(ESTIMATE_MAX_SECS))
}

/// Locally simulated progress for `elapsed` time against `estimate`.
///
/// Follows `ceiling * (1 - e^(-2t/estimate))`: ~86% of the ceiling at the
/// estimate, then keeps creeping without ever reaching it.
pub fn simulated_progress(elapsed: Duration, estimate: Duration) -> u8 {
    let estimate = estimate.as_secs_f64().max(1.0);
    let ratio = elapsed.as_secs_f64() / estimate;
    let value = SIMULATED_CEILING * (1.0 - (-2.0 * ratio).exp());
    value.clamp(0.0, SIMULATED_CEILING).floor() as u8
}

/// Pure reducer: shown progress is the max of every producer and never regresses.
pub fn effective_progress(previous: u8, authoritative: u8, simulated: u8) -> u8 {
    previous.max(authoritative).max(simulated).min(100)
}
