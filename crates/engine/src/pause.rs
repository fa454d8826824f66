use trackwatch_core::Tuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseVerdict {
    Hold,
    MarkPaused,
    MarkResumed,
}

/// Infers pauses the upstream never reports by watching how far expected
/// progress moved since the last poll that showed movement.
#[derive(Debug, Default)]
pub struct PauseDetector {
    /// Last expected-progress value observed moving.
    expected_ref_ms: u64,
    stale_polls: u32,
}

impl PauseDetector {
    pub fn reset(&mut self, expected_ms: u64) {
        self.expected_ref_ms = expected_ms;
        self.stale_polls = 0;
    }

    /// Runs on every successful poll while live with a known duration.
    /// `expected_ms` must come from the un-paused progress formula.
    ///
    /// TODO: a run of min-spacing skips stretches the gap between
    /// reference updates, which can make the next comparison read as
    /// movement when playback actually stalled; revisit whether the
    /// reference should age out.
    pub fn observe(
        &mut self,
        expected_ms: u64,
        duration_ms: u64,
        currently_paused: bool,
        tuning: &Tuning,
    ) -> PauseVerdict {
        // A track running this far past its known length is stalled, not
        // mis-measured; skip the delta check entirely.
        if expected_ms > duration_ms + tuning.overrun_grace_ms {
            return if currently_paused {
                PauseVerdict::Hold
            } else {
                PauseVerdict::MarkPaused
            };
        }

        let delta = expected_ms.abs_diff(self.expected_ref_ms);

        if delta < tuning.stale_delta_ms {
            self.stale_polls += 1;
            let near_end =
                expected_ms as f64 >= tuning.pause_near_end_fraction * duration_ms as f64;
            if !currently_paused && self.stale_polls >= tuning.stale_polls_to_pause && !near_end {
                return PauseVerdict::MarkPaused;
            }
            PauseVerdict::Hold
        } else {
            self.stale_polls = 0;
            self.expected_ref_ms = expected_ms;
            if currently_paused {
                PauseVerdict::MarkResumed
            } else {
                PauseVerdict::Hold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PauseDetector, PauseVerdict};
    use trackwatch_core::Tuning;

    const DURATION: u64 = 200_000;

    #[test]
    fn three_stale_polls_declare_a_pause() {
        let tuning = Tuning::default();
        let mut det = PauseDetector::default();
        det.reset(10_000);

        assert_eq!(det.observe(10_500, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(det.observe(11_000, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(
            det.observe(11_500, DURATION, false, &tuning),
            PauseVerdict::MarkPaused
        );
    }

    #[test]
    fn movement_resets_the_stale_streak() {
        let tuning = Tuning::default();
        let mut det = PauseDetector::default();
        det.reset(10_000);

        assert_eq!(det.observe(10_500, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(det.observe(11_000, DURATION, false, &tuning), PauseVerdict::Hold);
        // Moved: streak resets, reference advances.
        assert_eq!(det.observe(16_000, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(det.observe(16_500, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(det.observe(17_000, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(
            det.observe(17_500, DURATION, false, &tuning),
            PauseVerdict::MarkPaused
        );
    }

    #[test]
    fn movement_while_paused_resumes() {
        let tuning = Tuning::default();
        let mut det = PauseDetector::default();
        det.reset(10_000);

        assert_eq!(
            det.observe(16_000, DURATION, true, &tuning),
            PauseVerdict::MarkResumed
        );
    }

    #[test]
    fn no_pause_near_the_end() {
        let tuning = Tuning::default();
        let mut det = PauseDetector::default();
        det.reset(191_000);

        // Past 95% of the duration: stale polls accumulate but never pause.
        assert_eq!(det.observe(191_200, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(det.observe(191_400, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(det.observe(191_600, DURATION, false, &tuning), PauseVerdict::Hold);
        assert_eq!(det.observe(191_800, DURATION, false, &tuning), PauseVerdict::Hold);
    }

    #[test]
    fn overrun_forces_a_pause_immediately() {
        let tuning = Tuning::default();
        let mut det = PauseDetector::default();
        det.reset(0);

        assert_eq!(
            det.observe(DURATION + 21_000, DURATION, false, &tuning),
            PauseVerdict::MarkPaused
        );
        // Already paused: no second edge.
        assert_eq!(
            det.observe(DURATION + 30_000, DURATION, true, &tuning),
            PauseVerdict::Hold
        );
    }

    #[test]
    fn overrun_within_grace_is_not_a_pause() {
        let tuning = Tuning::default();
        let mut det = PauseDetector::default();
        det.reset(DURATION);

        assert_eq!(
            det.observe(DURATION + 10_000, DURATION, false, &tuning),
            PauseVerdict::Hold
        );
    }
}
