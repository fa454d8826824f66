use std::time::{Duration, Instant};
use trackwatch_core::{AccessMode, ActivitySignal, Tuning};

/// Scheduling inputs owned by one engine instance. No ambient globals;
/// everything the cadence policy reads lives here.
#[derive(Debug, Default)]
pub struct SchedulerState {
    last_activity: Option<Instant>,
    last_track_change: Option<Instant>,
    last_request: Option<Instant>,
    consecutive_errors: u32,
    using_mediated: bool,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any interaction signal collapses into a single "last seen" stamp.
    pub fn record_activity(&mut self, _signal: ActivitySignal, now: Instant) {
        self.last_activity = Some(now);
    }

    pub fn note_track_change(&mut self, now: Instant) {
        self.last_track_change = Some(now);
    }

    pub fn access_mode(&self) -> AccessMode {
        if self.using_mediated {
            AccessMode::Mediated
        } else {
            AccessMode::Direct
        }
    }

    /// One-way: once the direct path reports restricted visibility, every
    /// later request goes through the intermediary.
    pub fn latch_mediated(&mut self) -> bool {
        let flipped = !self.using_mediated;
        self.using_mediated = true;
        flipped
    }

    /// False while the minimum inter-request spacing has not elapsed.
    pub fn spacing_ok(&self, now: Instant, tuning: &Tuning) -> bool {
        self.last_request.map_or(true, |at| {
            now.saturating_duration_since(at)
                >= Duration::from_millis(tuning.min_request_spacing_ms)
        })
    }

    pub fn record_request(&mut self, now: Instant) {
        self.last_request = Some(now);
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Backoff delay for this failure, then bump the streak.
    pub fn record_failure(&mut self, tuning: &Tuning) -> Duration {
        let grown =
            tuning.backoff_base_ms as f64 * tuning.backoff_growth.powi(self.consecutive_errors as i32);
        let delay_ms = (grown as u64).min(tuning.backoff_cap_ms);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        Duration::from_millis(delay_ms)
    }

    /// Tier policy, first match wins: recent activity plus a fresh track
    /// change polls fast; recent activity alone polls normal (slow when
    /// nothing is live); lapsed activity polls slow; otherwise idle.
    pub fn cadence_delay(&self, is_live: bool, now: Instant, tuning: &Tuning) -> Duration {
        let since_activity = self
            .last_activity
            .map(|at| now.saturating_duration_since(at));
        let since_change = self
            .last_track_change
            .map(|at| now.saturating_duration_since(at));

        let activity_recent =
            since_activity.is_some_and(|d| d < Duration::from_millis(tuning.activity_recent_ms));
        let activity_idle =
            since_activity.is_some_and(|d| d < Duration::from_millis(tuning.activity_idle_ms));
        let change_recent =
            since_change.is_some_and(|d| d < Duration::from_millis(tuning.track_change_recent_ms));

        let ms = if activity_recent && change_recent {
            tuning.fast_poll_ms
        } else if activity_recent {
            if is_live {
                tuning.normal_poll_ms
            } else {
                tuning.slow_poll_ms
            }
        } else if activity_idle {
            tuning.slow_poll_ms
        } else {
            tuning.idle_poll_ms
        };

        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::SchedulerState;
    use std::time::{Duration, Instant};
    use trackwatch_core::{AccessMode, ActivitySignal, Tuning};

    #[test]
    fn tiers_follow_activity_and_change_recency() {
        let tuning = Tuning::default();
        let now = Instant::now();
        let mut sched = SchedulerState::new();

        // No activity ever: idle.
        assert_eq!(
            sched.cadence_delay(true, now, &tuning),
            Duration::from_millis(tuning.idle_poll_ms)
        );

        sched.record_activity(ActivitySignal::KeyPress, now);
        sched.note_track_change(now);
        assert_eq!(
            sched.cadence_delay(true, now, &tuning),
            Duration::from_millis(tuning.fast_poll_ms)
        );

        // Change recency lapses first.
        let later = now + Duration::from_secs(15);
        assert_eq!(
            sched.cadence_delay(true, later, &tuning),
            Duration::from_millis(tuning.normal_poll_ms)
        );
        assert_eq!(
            sched.cadence_delay(false, later, &tuning),
            Duration::from_millis(tuning.slow_poll_ms)
        );

        // Activity lapses to the idle window.
        let much_later = now + Duration::from_secs(60);
        assert_eq!(
            sched.cadence_delay(true, much_later, &tuning),
            Duration::from_millis(tuning.slow_poll_ms)
        );

        let idle = now + Duration::from_secs(300);
        assert_eq!(
            sched.cadence_delay(true, idle, &tuning),
            Duration::from_millis(tuning.idle_poll_ms)
        );
    }

    #[test]
    fn minimum_spacing_blocks_bursts() {
        let tuning = Tuning::default();
        let now = Instant::now();
        let mut sched = SchedulerState::new();

        assert!(sched.spacing_ok(now, &tuning));
        sched.record_request(now);
        assert!(!sched.spacing_ok(now + Duration::from_millis(200), &tuning));
        assert!(sched.spacing_ok(now + Duration::from_millis(800), &tuning));
    }

    #[test]
    fn backoff_grows_and_resets() {
        let tuning = Tuning::default();
        let mut sched = SchedulerState::new();

        assert_eq!(sched.record_failure(&tuning), Duration::from_millis(2_000));
        assert_eq!(sched.record_failure(&tuning), Duration::from_millis(4_000));
        assert_eq!(sched.record_failure(&tuning), Duration::from_millis(8_000));

        // Capped.
        for _ in 0..10 {
            sched.record_failure(&tuning);
        }
        assert_eq!(
            sched.record_failure(&tuning),
            Duration::from_millis(tuning.backoff_cap_ms)
        );

        sched.record_success();
        assert_eq!(sched.record_failure(&tuning), Duration::from_millis(2_000));
    }

    #[test]
    fn mediated_latch_is_one_way() {
        let mut sched = SchedulerState::new();
        assert_eq!(sched.access_mode(), AccessMode::Direct);

        assert!(sched.latch_mediated());
        assert_eq!(sched.access_mode(), AccessMode::Mediated);

        // Second latch reports no flip and nothing ever reverts it.
        assert!(!sched.latch_mediated());
        sched.record_success();
        assert_eq!(sched.access_mode(), AccessMode::Mediated);
    }
}
