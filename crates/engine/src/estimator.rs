use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use trackwatch_core::{AccessMode, TrackIdentity, TrackSnapshot, Tuning};
use trackwatch_upstream::RecentTracksApi;

/// How recently a finished play of the same track ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeWindow {
    /// Finished moments ago: the user likely scrubbed back near the end.
    NearEnd,
    /// Finished a little while ago: likely picked up mid-track.
    MidTrack,
}

/// Scans recent history (most recent first, now-playing entry excluded)
/// for a completed play of `identity` and classifies how fresh it is.
/// A match older than the evidence window is treated as no evidence.
pub fn find_resume_candidate(
    identity: &TrackIdentity,
    history: &[TrackSnapshot],
    now_unix: i64,
    tuning: &Tuning,
) -> Option<ResumeWindow> {
    let hit = history
        .iter()
        .take(tuning.history_match_scan)
        .find(|entry| entry.identity() == *identity && entry.scrobbled_at_unix.is_some())?;

    let completed_at = hit.scrobbled_at_unix?;
    let age_ms = (now_unix - completed_at).checked_mul(1_000)?;
    if age_ms < 0 {
        return None;
    }
    let age_ms = age_ms as u64;

    if age_ms < tuning.resume_near_end_window_ms {
        Some(ResumeWindow::NearEnd)
    } else if age_ms < tuning.resume_mid_window_ms {
        Some(ResumeWindow::MidTrack)
    } else {
        // Inside the evidence window the match still rules out guessing;
        // either way no offset is assigned.
        None
    }
}

/// Offset for a classified resume. Zero when the track is too short to
/// bother resuming into.
pub fn resume_offset(window: ResumeWindow, duration_ms: u64, tuning: &Tuning) -> u64 {
    if duration_ms <= tuning.min_resumable_duration_ms {
        return 0;
    }
    match window {
        ResumeWindow::NearEnd => {
            let fraction = (tuning.near_end_resume_fraction * duration_ms as f64) as u64;
            fraction.min(duration_ms.saturating_sub(tuning.near_end_tail_guard_ms))
        }
        ResumeWindow::MidTrack => {
            let fraction = (tuning.mid_resume_fraction * duration_ms as f64) as u64;
            fraction.min(tuning.mid_resume_cap_ms)
        }
    }
}

/// True when the recent window shows the user hopping between tracks, in
/// which case the current play is assumed to start from zero.
pub fn looks_like_active_switching(
    history: &[TrackSnapshot],
    now_unix: i64,
    tuning: &Tuning,
) -> bool {
    let cutoff = now_unix - (tuning.switching_window_ms / 1_000) as i64;
    let identities: HashSet<TrackIdentity> = history
        .iter()
        .take(tuning.switching_scan)
        .filter(|entry| entry.scrobbled_at_unix.is_some_and(|uts| uts >= cutoff))
        .map(TrackSnapshot::identity)
        .collect();

    identities.len() >= tuning.switching_min_identities
}

/// Fire-and-forget resume-position guess for a freshly (re)started live
/// track. Never fails: every error path degrades to a zero offset.
pub async fn estimate_start_offset(
    api: &dyn RecentTracksApi,
    mode: AccessMode,
    track: &TrackSnapshot,
    history_limit: u32,
    tuning: &Tuning,
) -> u64 {
    let identity = track.identity();
    let now_unix = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => return 0,
    };

    let history = match api.recent_history(mode, history_limit).await {
        Ok(entries) => entries,
        Err(err) => {
            debug!(error = %err, "history fetch failed; assuming fresh start");
            return 0;
        }
    };
    let past: Vec<TrackSnapshot> = history
        .into_iter()
        .filter(|entry| !entry.is_now_playing)
        .collect();

    if let Some(window) = find_resume_candidate(&identity, &past, now_unix, tuning) {
        match api
            .track_duration(mode, &track.artist_name, &track.name)
            .await
        {
            Ok(Some(duration_ms)) => {
                let offset = resume_offset(window, duration_ms, tuning);
                debug!(%identity, offset_ms = offset, ?window, "resume offset estimated");
                return offset;
            }
            Ok(None) => return 0,
            Err(err) => {
                debug!(error = %err, "duration fetch failed; assuming fresh start");
                return 0;
            }
        }
    }

    if looks_like_active_switching(&past, now_unix, tuning) {
        debug!(%identity, "recent history shows track hopping; fresh start");
    }
    0
}
