// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor emission: the published view of the integrated state.
//!
//! Each tick re-reads the true state through simulated instrumentation,
//! adding a small uniform jitter to every analog read-out. Flows below the
//! display floor are snapped to zero so idle lines do not show noise as
//! flow. Health scalars are reported exactly. The jitter is drawn from the
//! twin's seeded generator and never feeds back into the integrated state.

use rand::rngs::StdRng;
use rand::Rng;

use crate::simulation::state::{PlantState, StateView};

const FLOW_JITTER: f64 = 1.0;
const PRESSURE_JITTER: f64 = 0.1;
const LEVEL_JITTER: f64 = 0.01;
const TDS_JITTER: f64 = 5.0;
const CL_JITTER: f64 = 0.01;
const PH_JITTER: f64 = 0.05;
const DP_JITTER: f64 = 0.02;

/// Flows under this threshold are published as 0.
const FLOW_DISPLAY_FLOOR: f64 = 1.0;

fn jitter(rng: &mut StdRng, value: f64, amplitude: f64) -> f64 {
    (value + rng.gen_range(-amplitude..=amplitude)).max(0.0)
}

fn flow(rng: &mut StdRng, value: f64) -> f64 {
    if value < FLOW_DISPLAY_FLOOR {
        0.0
    } else {
        jitter(rng, value, FLOW_JITTER)
    }
}

/// Build the published view for one tick.
pub fn emit(state: &PlantState, rng: &mut StdRng) -> StateView {
    StateView {
        q_wellfield: flow(rng, state.q_wellfield),
        q_feed: flow(rng, state.q_feed),
        q_perm: flow(rng, state.q_perm),
        q_brine: flow(rng, state.q_brine),
        q_out: flow(rng, state.q_out),
        level_feed_tank: jitter(rng, state.level_feed_tank, LEVEL_JITTER),
        level_clearwell: jitter(rng, state.level_clearwell, LEVEL_JITTER),
        pressure_well: jitter(rng, state.pressure_well, PRESSURE_JITTER),
        pressure_feed: jitter(rng, state.pressure_feed, PRESSURE_JITTER),
        pressure_dist: jitter(rng, state.pressure_dist, PRESSURE_JITTER),
        dp_ro: jitter(rng, state.dp_ro, DP_JITTER),
        tds_feed: jitter(rng, state.tds_feed, TDS_JITTER),
        tds_perm: jitter(rng, state.tds_perm, TDS_JITTER),
        ph: jitter(rng, state.ph, PH_JITTER),
        cl: jitter(rng, state.cl, CL_JITTER),
        membrane_health: state.health.membrane,
        pump_well_health: state.health.pump_well,
        pump_feed_health: state.health.pump_feed,
        pump_dist_health: state.health.pump_dist,
        pipe_well_health: state.health.pipe_well,
        pipe_feed_health: state.health.pipe_feed,
        pipe_dist_health: state.health.pipe_dist,
    }
}
