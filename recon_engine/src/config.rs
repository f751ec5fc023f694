use chrono::Duration;

pub const DEFAULT_COLLISION_WINDOW: Duration = Duration::minutes(10);
pub const DEFAULT_UNCONFIRMED_CUTOFF: Duration = Duration::hours(24);
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 300;
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// Tuning knobs for the reconciliation jobs. Passed explicitly to each job at construction;
/// there is no global state.
#[derive(Debug, Clone)]
pub struct ReconConfig {
    /// Orders modified by the *other* poller more recently than this are deferred rather than
    /// raced. Soft mutual exclusion only; see the concurrency notes in the crate docs.
    pub collision_window: Duration,
    /// Orders awaiting payment confirmation for longer than this are failed.
    pub unconfirmed_cutoff: Duration,
    /// Fixed pause before settle/refund calls, to respect the gateway rate limit.
    pub settle_delay: std::time::Duration,
    /// Upper bound on continuation-token pagination loops, in case the gateway keeps handing
    /// out non-empty tokens.
    pub max_pages: u32,
    /// Where the gateway sends the payer after a hosted checkout completes.
    pub checkout_success_url: String,
    /// Where the gateway sends the payer after an abandoned checkout.
    pub checkout_cancel_url: String,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            collision_window: DEFAULT_COLLISION_WINDOW,
            unconfirmed_cutoff: DEFAULT_UNCONFIRMED_CUTOFF,
            settle_delay: std::time::Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            max_pages: DEFAULT_MAX_PAGES,
            checkout_success_url: "http://localhost/checkout/success".to_string(),
            checkout_cancel_url: "http://localhost/checkout".to_string(),
        }
    }
}
