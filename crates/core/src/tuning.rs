use serde::{Deserialize, Serialize};

/// Every heuristic threshold the engine runs on, in one overridable place.
/// The numbers are empirical, not derived; treat them as policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // Poll cadence tiers.
    pub fast_poll_ms: u64,
    pub normal_poll_ms: u64,
    pub slow_poll_ms: u64,
    pub idle_poll_ms: u64,
    /// Hard floor between upstream requests; a poll due sooner is skipped.
    pub min_request_spacing_ms: u64,
    /// Activity newer than this selects the responsive tiers.
    pub activity_recent_ms: u64,
    /// Activity newer than this (but not recent) selects the slow tier.
    pub activity_idle_ms: u64,
    /// Track change newer than this, combined with recent activity,
    /// selects the fast tier.
    pub track_change_recent_ms: u64,

    // Failure backoff: min(cap, base * growth^consecutive_errors).
    pub backoff_base_ms: u64,
    pub backoff_growth: f64,
    pub backoff_cap_ms: u64,

    // Pause detection.
    /// Expected-progress movement below this counts as a stale poll.
    pub stale_delta_ms: u64,
    /// Stale polls in a row before declaring a pause.
    pub stale_polls_to_pause: u32,
    /// No pause is declared past this fraction of the track.
    pub pause_near_end_fraction: f64,
    /// Progress past duration by more than this forces a pause.
    pub overrun_grace_ms: u64,

    // Resume-position estimation.
    pub resume_near_end_window_ms: u64,
    pub resume_mid_window_ms: u64,
    pub resume_evidence_window_ms: u64,
    pub min_resumable_duration_ms: u64,
    pub near_end_resume_fraction: f64,
    pub near_end_tail_guard_ms: u64,
    pub mid_resume_fraction: f64,
    pub mid_resume_cap_ms: u64,
    pub history_match_scan: usize,
    pub switching_scan: usize,
    pub switching_window_ms: u64,
    pub switching_min_identities: usize,

    /// Percent window used when the real duration is unknown.
    pub fallback_duration_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            fast_poll_ms: 3_000,
            normal_poll_ms: 6_000,
            slow_poll_ms: 12_000,
            idle_poll_ms: 24_000,
            min_request_spacing_ms: 800,
            activity_recent_ms: 30_000,
            activity_idle_ms: 120_000,
            track_change_recent_ms: 10_000,
            backoff_base_ms: 2_000,
            backoff_growth: 2.0,
            backoff_cap_ms: 60_000,
            stale_delta_ms: 2_000,
            stale_polls_to_pause: 3,
            pause_near_end_fraction: 0.95,
            overrun_grace_ms: 20_000,
            resume_near_end_window_ms: 30_000,
            resume_mid_window_ms: 120_000,
            resume_evidence_window_ms: 300_000,
            min_resumable_duration_ms: 60_000,
            near_end_resume_fraction: 0.7,
            near_end_tail_guard_ms: 30_000,
            mid_resume_fraction: 0.3,
            mid_resume_cap_ms: 60_000,
            history_match_scan: 7,
            switching_scan: 6,
            switching_window_ms: 1_800_000,
            switching_min_identities: 2,
            fallback_duration_ms: 180_000,
        }
    }
}
