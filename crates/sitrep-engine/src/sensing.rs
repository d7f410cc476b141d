//! Active sensing: asking the world to look again.
//!
//! A lost track whose risk still clears the criticality band is worth
//! reacquiring. The stage hands a reacquisition recommendation to the
//! injected actuator, at most one outstanding per track, repeats spaced by
//! the sensing cooldown, all of it against the sensing half of the attention
//! budget. Actuator outcomes never feed back into engine state: the request
//! is recorded on the track whether the actuator succeeds, fails, or was
//! never supplied, so a flaky sensor cannot fork a replay.

use sitrep_core::{ActiveSensingActuator, SenseRequest, Tick, Visibility};

use crate::budget::AttentionBudget;
use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::track::TrackSet;

/// Issues reacquisition requests for high-risk lost tracks.
pub fn run(
    tracks: &mut TrackSet,
    now: Tick,
    budget: &mut AttentionBudget,
    config: &EngineConfig,
    actuator: Option<&dyn ActiveSensingActuator>,
    diagnostics: &dyn DiagnosticSink,
) -> Vec<SenseRequest> {
    let mut requests = Vec::new();
    for id in tracks.ids() {
        let Some(track) = tracks.get_mut(&id) else {
            continue;
        };
        if track.visibility() != Visibility::Lost {
            continue;
        }
        let Some(band) = track.band() else {
            continue;
        };
        if band < config.sensing.criticality_band {
            continue;
        }
        match track.last_sense_request() {
            // One outstanding request per track; repeats only after the
            // cooldown.
            Some(last) if now.ticks_since(last) < config.sensing.cooldown_ticks => continue,
            _ => {}
        }
        if !budget.try_consume_sense() {
            tracing::debug!(tick = now.get(), "sensing budget exhausted");
            break;
        }

        let request = SenseRequest {
            track_id: id,
            tick: now,
            last_position: track.position(),
            last_velocity: track.kinematics().velocity,
            urgency: band,
            last_seen_tick: track.last_seen(),
        };
        if let Some(actuator) = actuator {
            if let Err(error) = actuator.request_scan(&request) {
                tracing::warn!(
                    track_id = %id,
                    actuator = actuator.name(),
                    %error,
                    "reacquisition request failed"
                );
                diagnostics.record(DiagnosticEvent::ActuatorFailure {
                    tick: now,
                    track_id: id,
                    message: error.to_string(),
                });
            }
        }
        track.record_sense_request(now);
        tracing::debug!(track_id = %id, urgency = %band, "reacquisition requested");
        requests.push(request);
    }
    requests
}
