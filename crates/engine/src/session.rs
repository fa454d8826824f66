use std::time::Instant;
use trackwatch_core::{TrackIdentity, TrackSnapshot};

/// Mutable per-track state, single-writer. Replaced wholesale on every
/// identity change; never patched field-by-field across tracks.
///
/// Invariants: `is_paused` implies `is_live`; `paused_at` is set iff
/// `is_paused`.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    pub current_identity: Option<TrackIdentity>,
    /// Latest snapshot, kept for display even after playback stops.
    pub track: Option<TrackSnapshot>,
    pub is_live: bool,
    pub started_at: Option<Instant>,
    pub estimated_start_offset_ms: u64,
    pub total_paused_ms: u64,
    pub paused_at: Option<Instant>,
    pub is_paused: bool,
    /// Fetched once per identity, never revised.
    pub duration_ms: Option<u64>,
}

impl PlaybackSession {
    /// Full replacement for a freshly observed live track.
    pub fn restart(&mut self, snapshot: TrackSnapshot, now: Instant) {
        *self = Self {
            current_identity: Some(snapshot.identity()),
            track: Some(snapshot),
            is_live: true,
            started_at: Some(now),
            ..Self::default()
        };
    }

    /// Teardown when the upstream reports not-live. The identity is
    /// forgotten so a later reappearance of the same track is a fresh
    /// start; the snapshot itself survives for display.
    pub fn clear_live_state(&mut self, last_seen: Option<TrackSnapshot>) {
        *self = Self {
            track: last_seen.or_else(|| self.track.take()),
            ..Self::default()
        };
    }

    /// Elapsed playback shown to consumers: frozen while paused, zero
    /// while not live.
    pub fn progress_at(&self, now: Instant) -> u64 {
        let Some(started_at) = self.started_at else {
            return 0;
        };
        if !self.is_live {
            return 0;
        }

        let anchor = match (self.is_paused, self.paused_at) {
            (true, Some(paused_at)) => paused_at,
            _ => now,
        };
        let elapsed_ms = anchor.saturating_duration_since(started_at).as_millis() as u64;
        elapsed_ms.saturating_sub(self.total_paused_ms) + self.estimated_start_offset_ms
    }

    /// The un-paused formula, used by the pause detector regardless of the
    /// current paused flag.
    pub fn expected_progress_at(&self, now: Instant) -> u64 {
        let Some(started_at) = self.started_at else {
            return 0;
        };
        if !self.is_live {
            return 0;
        }
        let elapsed_ms = now.saturating_duration_since(started_at).as_millis() as u64;
        elapsed_ms.saturating_sub(self.total_paused_ms) + self.estimated_start_offset_ms
    }
}

#[cfg(test)]
mod tests {
    use super::PlaybackSession;
    use std::time::{Duration, Instant};
    use trackwatch_core::TrackSnapshot;

    fn snapshot() -> TrackSnapshot {
        TrackSnapshot {
            name: "Song".to_string(),
            artist_name: "Artist".to_string(),
            album_name: "Album".to_string(),
            image_urls: vec![],
            is_now_playing: true,
            scrobbled_at_unix: None,
        }
    }

    #[test]
    fn progress_runs_from_start() {
        let start = Instant::now();
        let mut session = PlaybackSession::default();
        session.restart(snapshot(), start);

        assert_eq!(session.progress_at(start), 0);
        assert_eq!(session.progress_at(start + Duration::from_millis(4_500)), 4_500);
    }

    #[test]
    fn progress_freezes_at_pause_point() {
        let start = Instant::now();
        let mut session = PlaybackSession::default();
        session.restart(snapshot(), start);
        session.is_paused = true;
        session.paused_at = Some(start + Duration::from_secs(10));

        let much_later = start + Duration::from_secs(60);
        assert_eq!(session.progress_at(much_later), 10_000);
        // The un-paused formula keeps running.
        assert_eq!(session.expected_progress_at(much_later), 60_000);
    }

    #[test]
    fn paused_time_is_excluded_after_resume() {
        let start = Instant::now();
        let mut session = PlaybackSession::default();
        session.restart(snapshot(), start);
        session.total_paused_ms = 20_000;

        assert_eq!(session.progress_at(start + Duration::from_secs(50)), 30_000);
    }

    #[test]
    fn offset_shifts_progress() {
        let start = Instant::now();
        let mut session = PlaybackSession::default();
        session.restart(snapshot(), start);
        session.estimated_start_offset_ms = 90_000;

        assert_eq!(session.progress_at(start + Duration::from_secs(5)), 95_000);
    }

    #[test]
    fn teardown_keeps_track_but_zeroes_progress() {
        let start = Instant::now();
        let mut session = PlaybackSession::default();
        session.restart(snapshot(), start);
        session.duration_ms = Some(200_000);
        session.total_paused_ms = 5_000;

        session.clear_live_state(None);

        assert!(session.track.is_some());
        assert!(session.current_identity.is_none());
        assert!(!session.is_live);
        assert_eq!(session.duration_ms, None);
        assert_eq!(session.total_paused_ms, 0);
        assert_eq!(session.progress_at(start + Duration::from_secs(5)), 0);
    }
}
