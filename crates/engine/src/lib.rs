use std::time::{Duration, Instant};
use tracing::{debug, info};
use trackwatch_core::{
    AccessMode, ActivitySignal, NowPlayingFacet, TrackIdentity, TrackSnapshot, Tuning,
};
use trackwatch_upstream::UpstreamError;

mod estimator;
mod pause;
mod scheduler;
mod session;

pub use estimator::{
    estimate_start_offset, find_resume_candidate, looks_like_active_switching, resume_offset,
    ResumeWindow,
};
pub use pause::{PauseDetector, PauseVerdict};
pub use scheduler::SchedulerState;
pub use session::PlaybackSession;

/// What one poll attempt produced.
#[derive(Debug)]
pub enum PollOutcome {
    /// A well-formed response; None when the account has no tracks at all.
    Snapshot(Option<TrackSnapshot>),
    Failed(UpstreamError),
}

/// Gate decision before contacting the upstream.
#[derive(Debug)]
pub enum PollGate {
    Proceed { mode: AccessMode },
    /// Minimum inter-request spacing not yet elapsed; no upstream call.
    Skip { retry_in: Duration },
}

/// Edge-triggered state transitions; each occurrence is reported once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    TrackChanged { identity: TrackIdentity },
    PlaybackStopped,
    Paused,
    Resumed,
    SwitchedToMediated,
}

#[derive(Debug)]
pub struct EngineOutput {
    pub next_poll_in: Duration,
    pub events: Vec<EngineEvent>,
    /// Freshly (re)started live track to run the position estimator for.
    pub estimate_for: Option<TrackSnapshot>,
    /// (artist, track) pair to fetch a duration for, once per identity.
    pub fetch_duration_for: Option<(String, String)>,
}

/// The now-playing state engine for a single tracked identity. All state
/// mutation happens here, synchronously, driven by one poll at a time;
/// background estimator/duration results come back through the identity-
/// guarded `apply_*` writes.
pub struct Engine {
    tuning: Tuning,
    session: PlaybackSession,
    scheduler: SchedulerState,
    pause: PauseDetector,
}

impl Engine {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            tuning,
            session: PlaybackSession::default(),
            scheduler: SchedulerState::new(),
            pause: PauseDetector::default(),
        }
    }

    pub fn update_tuning(&mut self, tuning: Tuning) {
        self.tuning = tuning;
    }

    pub fn record_activity(&mut self, signal: ActivitySignal, now: Instant) {
        self.scheduler.record_activity(signal, now);
    }

    pub fn access_mode(&self) -> AccessMode {
        self.scheduler.access_mode()
    }

    /// Decide whether the due poll may actually hit the upstream. A skip
    /// re-arms with the normal cadence and counts no request.
    pub fn begin_poll(&mut self, now: Instant) -> PollGate {
        if !self.scheduler.spacing_ok(now, &self.tuning) {
            return PollGate::Skip {
                retry_in: self
                    .scheduler
                    .cadence_delay(self.session.is_live, now, &self.tuning),
            };
        }
        self.scheduler.record_request(now);
        PollGate::Proceed {
            mode: self.scheduler.access_mode(),
        }
    }

    /// Digest one poll attempt and re-arm the scheduler. Never fails; every
    /// error path still produces a next delay.
    pub fn observe(&mut self, outcome: PollOutcome, now: Instant) -> EngineOutput {
        let mut events = Vec::new();
        let mut estimate_for = None;
        let mut fetch_duration_for = None;

        let next_poll_in = match outcome {
            PollOutcome::Failed(UpstreamError::VisibilityRestricted) => {
                if self.scheduler.latch_mediated() {
                    info!("direct access restricted; switching to mediated endpoint");
                    events.push(EngineEvent::SwitchedToMediated);
                }
                // Retry on the other path as soon as the spacing floor
                // allows; not an error streak.
                Duration::from_millis(self.tuning.min_request_spacing_ms)
            }
            PollOutcome::Failed(UpstreamError::Malformed(reason)) => {
                // No track this poll; identity state stays untouched.
                debug!(%reason, "malformed poll response ignored");
                self.scheduler.record_success();
                self.scheduler
                    .cadence_delay(self.session.is_live, now, &self.tuning)
            }
            PollOutcome::Failed(UpstreamError::Network(reason)) => {
                debug!(%reason, "poll failed; backing off");
                self.scheduler.record_failure(&self.tuning)
            }
            PollOutcome::Snapshot(snapshot) => {
                self.scheduler.record_success();
                self.apply_snapshot(
                    snapshot,
                    now,
                    &mut events,
                    &mut estimate_for,
                    &mut fetch_duration_for,
                );
                self.scheduler
                    .cadence_delay(self.session.is_live, now, &self.tuning)
            }
        };

        EngineOutput {
            next_poll_in,
            events,
            estimate_for,
            fetch_duration_for,
        }
    }

    fn apply_snapshot(
        &mut self,
        snapshot: Option<TrackSnapshot>,
        now: Instant,
        events: &mut Vec<EngineEvent>,
        estimate_for: &mut Option<TrackSnapshot>,
        fetch_duration_for: &mut Option<(String, String)>,
    ) {
        let Some(snapshot) = snapshot else {
            if self.session.is_live {
                events.push(EngineEvent::PlaybackStopped);
            }
            self.session.clear_live_state(None);
            self.pause.reset(0);
            return;
        };

        if !snapshot.is_now_playing {
            // Regardless of identity match: tear down and forget, so a
            // later reappearance of the same track starts fresh.
            if self.session.is_live {
                events.push(EngineEvent::PlaybackStopped);
            }
            self.session.clear_live_state(Some(snapshot));
            self.pause.reset(0);
            return;
        }

        let identity = snapshot.identity();
        let changed = self.session.current_identity.as_ref() != Some(&identity);

        if changed {
            info!(%identity, "track changed");
            self.session.restart(snapshot.clone(), now);
            self.scheduler.note_track_change(now);
            self.pause.reset(self.session.expected_progress_at(now));
            events.push(EngineEvent::TrackChanged {
                identity: identity.clone(),
            });
            *estimate_for = Some(snapshot.clone());
            *fetch_duration_for = Some((snapshot.artist_name, snapshot.name));
        } else if self.session.started_at.is_none() {
            // First live observation for an identity known from before the
            // clock started; anchor it now without touching pause or
            // duration state.
            self.session.is_live = true;
            self.session.started_at = Some(now);
            self.session.track = Some(snapshot.clone());
            self.pause.reset(self.session.expected_progress_at(now));
            *estimate_for = Some(snapshot);
        } else {
            self.session.track = Some(snapshot);
            self.session.is_live = true;
            self.run_pause_detector(now, events);
        }
    }

    fn run_pause_detector(&mut self, now: Instant, events: &mut Vec<EngineEvent>) {
        let Some(duration_ms) = self.session.duration_ms else {
            return;
        };
        let expected = self.session.expected_progress_at(now);
        match self
            .pause
            .observe(expected, duration_ms, self.session.is_paused, &self.tuning)
        {
            PauseVerdict::MarkPaused => {
                self.session.is_paused = true;
                self.session.paused_at = Some(now);
                info!("playback pause inferred");
                events.push(EngineEvent::Paused);
            }
            PauseVerdict::MarkResumed => {
                if let Some(paused_at) = self.session.paused_at.take() {
                    self.session.total_paused_ms +=
                        now.saturating_duration_since(paused_at).as_millis() as u64;
                }
                self.session.is_paused = false;
                info!("playback resume inferred");
                events.push(EngineEvent::Resumed);
            }
            PauseVerdict::Hold => {}
        }
    }

    /// Background write from the position estimator. Discarded when the
    /// identity was superseded meanwhile, when an offset was already
    /// applied, or when the guess is zero (a zero offset is not an
    /// estimate).
    pub fn apply_estimated_offset(&mut self, identity: &TrackIdentity, offset_ms: u64) -> bool {
        if self.session.current_identity.as_ref() != Some(identity) {
            debug!(%identity, "discarding stale offset estimate");
            return false;
        }
        if offset_ms == 0 || self.session.estimated_start_offset_ms != 0 {
            return false;
        }
        self.session.estimated_start_offset_ms = offset_ms;
        info!(%identity, offset_ms, "resume position applied");
        true
    }

    /// Background write from the duration fetch; once per identity.
    pub fn apply_duration(&mut self, identity: &TrackIdentity, duration_ms: u64) -> bool {
        if self.session.current_identity.as_ref() != Some(identity) {
            debug!(%identity, "discarding stale duration");
            return false;
        }
        if self.session.duration_ms.is_some() || duration_ms == 0 {
            return false;
        }
        self.session.duration_ms = Some(duration_ms);
        true
    }

    /// True while the facet refresh ticker should run. Paused and
    /// not-live sessions do not tick; their progress is exact without it.
    pub fn ticker_active(&self) -> bool {
        self.session.is_live && !self.session.is_paused && self.session.started_at.is_some()
    }

    /// The read-only projection consumers see.
    pub fn facet(&self, now: Instant) -> NowPlayingFacet {
        let progress_ms = self.session.progress_at(now);
        let duration_ms = self.session.duration_ms;
        let window_ms = duration_ms.unwrap_or(self.tuning.fallback_duration_ms);
        let percent = if window_ms == 0 {
            0.0
        } else {
            (progress_ms as f64 / window_ms as f64 * 100.0).clamp(0.0, 100.0)
        };

        NowPlayingFacet {
            track: self.session.track.clone(),
            is_live: self.session.is_live,
            is_paused: self.session.is_paused,
            progress_ms,
            duration_ms,
            percent,
            is_position_estimated: self.session.estimated_start_offset_ms > 0,
        }
    }
}
