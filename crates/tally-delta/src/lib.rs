//! Pure session-delta computation between two cumulative snapshots.

use tally_types::player::{PlayerSnapshot, SessionDelta};

/// Computes `current − baseline` for every tracked counter, including
/// playtime hours, which diffs against the lifetime baseline like the rest.
///
/// Cumulative counters only ever grow server-side, so a negative result
/// means the remote system reset the player's lifetime stats. Affected
/// counters are clamped to zero and `counter_reset` is raised instead of
/// reporting negative session progress; tracking continues.
pub fn diff(baseline: &PlayerSnapshot, current: &PlayerSnapshot) -> SessionDelta {
    let mut reset = false;
    SessionDelta {
        kills: counter_delta(baseline.kills, current.kills, &mut reset),
        deaths: counter_delta(baseline.deaths, current.deaths, &mut reset),
        headshots: counter_delta(baseline.headshots, current.headshots, &mut reset),
        damage_dealt: float_delta(baseline.damage_dealt, current.damage_dealt, &mut reset),
        playtime_hours: float_delta(baseline.playtime_hours, current.playtime_hours, &mut reset),
        counter_reset: reset,
    }
}

fn counter_delta(baseline: u64, current: u64, reset: &mut bool) -> u64 {
    if current < baseline {
        *reset = true;
        0
    } else {
        current - baseline
    }
}

fn float_delta(baseline: f64, current: f64, reset: &mut bool) -> f64 {
    if current < baseline {
        *reset = true;
        0.0
    } else {
        current - baseline
    }
}
