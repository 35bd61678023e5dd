use serde::Serialize;

// Fixed 67/23/10 split, in percent. These are placeholders, not a measured
// breakdown: nothing here observes screen state or sleep residency.
const SCREEN_ON_PERCENT: u64 = 67;
const SCREEN_OFF_PERCENT: u64 = 23;
const DEEP_SLEEP_PERCENT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageBreakdown {
    pub screen_on: u64,
    pub screen_off: u64,
    pub deep_sleep: u64,
}

/// Each share is floored on its own, so the parts may sum to slightly less
/// than the total.
pub fn attribute(total_rate_milliamps: u64) -> UsageBreakdown {
    // Widened so the product cannot overflow; the quotient always fits back.
    let share = |percent: u64| {
        let scaled = u128::from(total_rate_milliamps) * u128::from(percent) / 100;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    };
    UsageBreakdown {
        screen_on: share(SCREEN_ON_PERCENT),
        screen_off: share(SCREEN_OFF_PERCENT),
        deep_sleep: share(DEEP_SLEEP_PERCENT),
    }
}
