//! Per-tick layer synchronization against the primary track clock.

use lyricap_common::clock::DriftMeasurement;
use lyricap_common::error::LyricapResult;
use lyricap_project_model::project::ProjectSnapshot;
use lyricap_project_model::slide::AssetKey;
use lyricap_project_model::timeline::Timeline;

use crate::assets::AssetRegistry;
use crate::backend::SharedElement;

/// Corrections applied while syncing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub corrective_seeks: u64,
    pub loop_wraps: u64,
}

/// Seek `element` to `target` only when it has drifted past `tolerance`.
///
/// Targets past the end of the media are held at its last frame, so a slide
/// that outlasts its asset settles there instead of seeking every tick.
fn correct_drift(
    element: &SharedElement,
    target: f64,
    tolerance: f64,
    stats: &mut SyncStats,
) -> bool {
    let target = match element.duration() {
        Some(duration) if target >= duration => {
            if element.ended() {
                return false;
            }
            duration
        }
        _ => target,
    };
    let drift = DriftMeasurement::new(target, element.current_time());
    if !drift.exceeds(tolerance) {
        return false;
    }
    tracing::debug!(
        source = element.source_ref(),
        drift_ms = drift.drift_ms(),
        target,
        "Corrective seek"
    );
    element.seek(target);
    stats.corrective_seeks += 1;
    true
}

/// Resume a paused element. An element already at its end stays put, since
/// playing it again would restart it from zero.
fn ensure_playing(element: &SharedElement) -> LyricapResult<()> {
    if element.is_paused() && !element.ended() {
        element.play()?;
    }
    Ok(())
}

/// Keep the active video slide playing in step with `t`; pause the rest.
pub fn sync_primary_layer(
    t: f64,
    timeline: &Timeline,
    assets: &AssetRegistry,
    tolerance: f64,
    stats: &mut SyncStats,
) -> LyricapResult<()> {
    let active_id = timeline.active_visual_at(t).map(|s| s.id.as_str());

    for slide in timeline.video_slides() {
        let Some(element) = assets.element(&slide.asset_key()) else {
            continue;
        };
        if Some(slide.id.as_str()) == active_id {
            correct_drift(element, slide.relative_position(t), tolerance, stats);
            element.set_muted(slide.is_muted);
            element.set_volume(slide.volume);
            ensure_playing(element)?;
        } else if !element.is_paused() {
            element.pause();
        }
    }
    Ok(())
}

/// Keep the looping background video at `t mod duration`.
pub fn sync_background(
    t: f64,
    assets: &AssetRegistry,
    tolerance: f64,
    stats: &mut SyncStats,
) -> LyricapResult<()> {
    let Some(element) = assets.element(&AssetKey::Background) else {
        return Ok(());
    };

    if let Some(duration) = element.duration().filter(|d| *d > 0.0) {
        let target = t % duration;
        let current = element.current_time();
        if target < current - duration / 2.0 {
            // The clock wrapped around before the element did.
            element.seek(target);
            stats.loop_wraps += 1;
        } else {
            correct_drift(element, target, tolerance, stats);
        }
    }
    ensure_playing(element)
}

/// Play active audio slides at their relative position; silence the rest.
pub fn sync_audio_layer(
    t: f64,
    timeline: &Timeline,
    assets: &AssetRegistry,
    tolerance: f64,
    stats: &mut SyncStats,
) -> LyricapResult<()> {
    for slide in timeline.audio_slides() {
        let Some(element) = assets.element(&slide.asset_key()) else {
            continue;
        };
        if slide.contains(t) {
            correct_drift(element, slide.relative_position(t), tolerance, stats);
            element.set_volume(slide.volume);
            element.set_muted(slide.is_muted);
            ensure_playing(element)?;
        } else {
            if !element.is_paused() {
                element.pause();
            }
            if !element.is_muted() {
                element.set_muted(true);
            }
        }
    }
    Ok(())
}

/// Run every layer rule for time `t`.
pub fn sync_layers(
    t: f64,
    snapshot: &ProjectSnapshot,
    assets: &AssetRegistry,
    tolerance: f64,
    stats: &mut SyncStats,
) -> LyricapResult<()> {
    sync_primary_layer(t, &snapshot.timeline, assets, tolerance, stats)?;
    sync_background(t, assets, tolerance, stats)?;
    sync_audio_layer(t, &snapshot.timeline, assets, tolerance, stats)
}
