// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Fixed-step plant physics.
//!
//! One call to [`step`] advances the integrated state by `dt` seconds:
//! actuator targets, first-order ramps, damage accrual, chemistry, and the
//! tank mass balance, in that order. The step is deterministic for a given
//! `(state, controls, time, dt)`; sensor jitter lives in
//! [`crate::simulation::sensors`] and never feeds back into this module.

use std::f64::consts::TAU;

use log::warn;

use crate::simulation::state::{Controls, PlantState};

/// Permeate flow as a fraction of feed flow.
pub const RO_RECOVERY: f64 = 0.75;
/// Largest flow the distribution pump can deliver, m³/h. `Q_out_sp` may be
/// written up to 150 but is capped here at use.
pub const DIST_PUMP_CAPACITY: f64 = 120.0;
/// Feed tank level ceiling, m.
pub const FEED_TANK_MAX_M: f64 = 5.0;
/// Clearwell level ceiling, m.
pub const CLEARWELL_MAX_M: f64 = 6.0;

const ALPHA_FLOW: f64 = 0.1;
const ALPHA_PRESSURE: f64 = 0.5;

const FEED_TANK_AREA_M2: f64 = 10.0;
const CLEARWELL_AREA_M2: f64 = 40.0;

/// Feed level below which the RO feed pump loses suction.
const SUCTION_MIN_LEVEL_M: f64 = 0.2;
/// Clearwell level below which the distribution pump can still start.
const DIST_MIN_LEVEL_M: f64 = 0.1;
/// Clearwell level below which a running distribution pump cavitates.
const DIST_CAVITATION_LEVEL_M: f64 = 0.2;

const TDS_FEED_BASE: f64 = 1250.0;
const TDS_FEED_AMP: f64 = 50.0;
const TDS_FEED_PERIOD_S: f64 = 86_400.0;

const MEMBRANE_REJECTION_CLEAN: f64 = 0.98;
/// Residual chlorine that starts oxidizing the membrane, mg/L.
const MEMBRANE_CL_LIMIT: f64 = 0.1;
/// Dose delivered into a stagnant line, mg/L.
const STAGNANT_CL: f64 = 50.0;

/// Per-actuator flow and pressure targets before first-order ramping.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Targets {
    q_well: f64,
    p_well: f64,
    q_feed: f64,
    p_feed: f64,
    q_dist: f64,
    p_dist: f64,
}

fn targets(controls: &Controls, state: &PlantState, suction_ok: bool) -> Targets {
    // Wellfield P-101 against XV-101.
    let (q_well, p_well) = if controls.wellfield_on && controls.valve_101_open {
        (110.0, 3.0)
    } else if controls.wellfield_on {
        // Deadhead against the closed discharge valve.
        (0.0, 12.0)
    } else {
        (0.0, 0.0)
    };

    // RO feed P-201 against XV-201/202/203; delivery derates with pump wear.
    let eta = state.health.pump_feed / 100.0;
    let (q_feed, p_feed) = if controls.ro_feed_pump_on && suction_ok {
        if controls.valve_201_open && controls.valve_202_open && controls.valve_203_open {
            (100.0 * eta, 12.0)
        } else if controls.valve_201_open {
            // RO train blocked downstream of the pump.
            (0.0, 30.0)
        } else {
            (0.0, 33.0)
        }
    } else {
        (0.0, 0.0)
    };

    // Distribution P-401 against XV-401.
    let (q_dist, p_dist) = if controls.dist_pump_on && state.level_clearwell > DIST_MIN_LEVEL_M {
        if controls.valve_401_open {
            (controls.q_out_sp.min(DIST_PUMP_CAPACITY), 4.0)
        } else {
            (0.0, 15.0)
        }
    } else {
        (0.0, 0.0)
    };

    Targets {
        q_well,
        p_well,
        q_feed,
        p_feed,
        q_dist,
        p_dist,
    }
}

fn ramp(current: f64, target: f64, alpha: f64) -> f64 {
    current + (target - current) * alpha
}

fn accrue(health: &mut f64, rate_pct_per_s: f64, dt: f64) {
    *health = (*health - rate_pct_per_s * dt).max(0.0);
}

fn apply_damage(state: &mut PlantState, controls: &Controls, suction_ok: bool, dt: f64) {
    let pressure_well = state.pressure_well;
    let pressure_feed = state.pressure_feed;
    let pressure_dist = state.pressure_dist;
    let clearwell_low = state.level_clearwell < DIST_CAVITATION_LEVEL_M;
    let chlorinated_feed = state.cl > MEMBRANE_CL_LIMIT && state.q_feed > 0.0;
    let health = &mut state.health;

    if controls.wellfield_on && !controls.valve_101_open {
        accrue(&mut health.pump_well, 0.3, dt);
    }
    if controls.ro_feed_pump_on && !suction_ok {
        accrue(&mut health.pump_feed, 0.5, dt);
    }
    if controls.dist_pump_on && clearwell_low {
        accrue(&mut health.pump_dist, 0.5, dt);
    }
    if controls.dist_pump_on && !controls.valve_401_open {
        accrue(&mut health.pump_dist, 0.3, dt);
    }
    if pressure_well > 10.0 {
        accrue(&mut health.pipe_well, 0.2, dt);
    }
    if pressure_feed > 20.0 {
        accrue(&mut health.pipe_feed, 0.5, dt);
    }
    if pressure_dist > 12.0 {
        accrue(&mut health.pipe_dist, 0.3, dt);
    }
    if chlorinated_feed {
        accrue(&mut health.membrane, 0.2, dt);
    }
    if pressure_feed > 20.0 {
        accrue(&mut health.membrane, 1.0, dt);
    }
}

fn chemistry(state: &mut PlantState, controls: &Controls, time_s: f64) {
    let current_cl = if controls.cl_pump_on && state.q_feed > 5.0 {
        0.9 * controls.cl_dose
    } else if controls.cl_pump_on && controls.cl_dose > 0.0 {
        // Dosing into a stagnant line super-chlorinates it.
        STAGNANT_CL
    } else {
        0.0
    };
    state.cl = ramp(state.cl, current_cl, 0.1);

    state.ph = 7.0
        + if controls.naoh_pump_on {
            0.15 * controls.naoh_dose
        } else {
            0.0
        };

    // Diurnal raw-water variation is the only plant-level "noise".
    state.tds_feed =
        (TDS_FEED_BASE + TDS_FEED_AMP * (TAU * time_s / TDS_FEED_PERIOD_S).sin()).max(0.0);

    let rejection = MEMBRANE_REJECTION_CLEAN * (state.health.membrane / 100.0);
    state.tds_perm = state.tds_feed * (1.0 - rejection);

    // A destroyed membrane leaks: differential pressure collapses along with
    // the rejection above.
    state.dp_ro = if state.q_feed > 1.0 {
        let clean = 0.5 + (state.q_feed / 100.0) * 1.5;
        if state.health.membrane < 30.0 {
            clean * 0.2
        } else {
            clean
        }
    } else {
        0.0
    };
}

fn mass_balance(state: &mut PlantState, dt: f64) {
    state.q_perm = state.q_feed * RO_RECOVERY;
    state.q_brine = state.q_feed - state.q_perm;

    state.level_feed_tank +=
        (state.q_wellfield - state.q_feed) * dt / 3600.0 / FEED_TANK_AREA_M2;
    state.level_feed_tank = state.level_feed_tank.clamp(0.0, FEED_TANK_MAX_M);

    state.level_clearwell += (state.q_perm - state.q_out) * dt / 3600.0 / CLEARWELL_AREA_M2;
    state.level_clearwell = state.level_clearwell.clamp(0.0, CLEARWELL_MAX_M);
}

/// Restore the previous finite value if an integration produced NaN/∞.
fn guard(name: &str, value: &mut f64, fallback: f64) {
    if !value.is_finite() {
        let restored = if fallback.is_finite() { fallback } else { 0.0 };
        warn!(
            "non-finite {} after tick, restoring last value {}",
            name, restored
        );
        *value = restored;
    }
}

/// Advance the plant by `dt` seconds. `time_s` is the simulation time at the
/// start of the step.
pub fn step(state: &mut PlantState, controls: &Controls, time_s: f64, dt: f64) {
    let before = state.clone();
    let suction_ok = state.level_feed_tank > SUCTION_MIN_LEVEL_M;

    let t = targets(controls, state, suction_ok);
    state.q_wellfield = ramp(state.q_wellfield, t.q_well, ALPHA_FLOW);
    state.q_feed = ramp(state.q_feed, t.q_feed, ALPHA_FLOW);
    state.q_out = ramp(state.q_out, t.q_dist, ALPHA_FLOW);
    state.pressure_well = ramp(state.pressure_well, t.p_well, ALPHA_PRESSURE);
    state.pressure_feed = ramp(state.pressure_feed, t.p_feed, ALPHA_PRESSURE);
    state.pressure_dist = ramp(state.pressure_dist, t.p_dist, ALPHA_PRESSURE);

    apply_damage(state, controls, suction_ok, dt);
    chemistry(state, controls, time_s);
    mass_balance(state, dt);

    guard("Q_wellfield", &mut state.q_wellfield, before.q_wellfield);
    guard("Q_feed", &mut state.q_feed, before.q_feed);
    guard("Q_perm", &mut state.q_perm, before.q_perm);
    guard("Q_brine", &mut state.q_brine, before.q_brine);
    guard("Q_out", &mut state.q_out, before.q_out);
    guard("level_feed_tank", &mut state.level_feed_tank, before.level_feed_tank);
    guard("level_clearwell", &mut state.level_clearwell, before.level_clearwell);
    guard("pressure_well", &mut state.pressure_well, before.pressure_well);
    guard("pressure_feed", &mut state.pressure_feed, before.pressure_feed);
    guard("pressure_dist", &mut state.pressure_dist, before.pressure_dist);
    guard("dP_ro_true", &mut state.dp_ro, before.dp_ro);
    guard("TDS_feed", &mut state.tds_feed, before.tds_feed);
    guard("TDS_perm", &mut state.tds_perm, before.tds_perm);
    guard("pH_true", &mut state.ph, before.ph);
    guard("Cl_true", &mut state.cl, before.cl);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::state::{Controls, PlantState};

    const DT: f64 = 0.1;

    fn run(state: &mut PlantState, controls: &Controls, seconds: f64) {
        let ticks = (seconds / DT).round() as u64;
        let mut time = 0.0;
        for _ in 0..ticks {
            step(state, controls, time, DT);
            time += DT;
        }
    }

    #[test]
    fn wellfield_ramps_to_nominal_flow_and_pressure() {
        let mut state = PlantState::default();
        let controls = Controls {
            wellfield_on: true,
            ..Controls::default()
        };
        run(&mut state, &controls, 20.0);
        assert!((state.q_wellfield - 110.0).abs() < 1.0);
        assert!((state.pressure_well - 3.0).abs() < 0.1);
    }

    #[test]
    fn wellfield_deadhead_spikes_pressure_and_wears_the_pump() {
        let mut state = PlantState::default();
        let controls = Controls {
            wellfield_on: true,
            valve_101_open: false,
            ..Controls::default()
        };
        run(&mut state, &controls, 10.0);
        assert!(state.q_wellfield < 1.0);
        assert!(state.pressure_well > 11.0);
        // 0.3 %/s against the closed valve, plus 0.2 %/s pipe stress above
        // 10 bar once the pressure has ramped up.
        assert!(state.health.pump_well < 100.0 - 0.3 * 9.0);
        assert!(state.health.pipe_well < 100.0);
    }

    #[test]
    fn pressures_react_faster_than_flows() {
        let mut state = PlantState::default();
        let controls = Controls {
            wellfield_on: true,
            ..Controls::default()
        };
        step(&mut state, &controls, 0.0, DT);
        assert_eq!(state.q_wellfield, 11.0);
        assert_eq!(state.pressure_well, 1.5);
        // Pressure covers half the gap per tick, flow only a tenth.
        assert!(state.pressure_well / 3.0 > state.q_wellfield / 110.0);
    }

    #[test]
    fn feed_pump_output_derates_with_pump_health() {
        let mut state = PlantState::default();
        state.health.pump_feed = 50.0;
        let controls = Controls {
            ro_feed_pump_on: true,
            ..Controls::default()
        };
        run(&mut state, &controls, 60.0);
        assert!((state.q_feed - 50.0).abs() < 2.0);
    }

    #[test]
    fn mass_balance_splits_feed_into_permeate_and_brine() {
        let mut state = PlantState::default();
        let controls = Controls {
            wellfield_on: true,
            ro_feed_pump_on: true,
            ..Controls::default()
        };
        run(&mut state, &controls, 30.0);
        assert!(state.q_feed > 50.0);
        assert!((state.q_feed - (state.q_perm + state.q_brine)).abs() < 1e-9);
        assert!((state.q_perm - state.q_feed * RO_RECOVERY).abs() < 1e-9);
    }

    #[test]
    fn levels_stay_clamped_within_their_tanks() {
        let mut state = PlantState::default();
        state.level_feed_tank = 4.99;
        let controls = Controls {
            wellfield_on: true,
            ..Controls::default()
        };
        run(&mut state, &controls, 120.0);
        assert_eq!(state.level_feed_tank, FEED_TANK_MAX_M);

        let mut state = PlantState::default();
        state.level_clearwell = 0.05;
        let controls = Controls {
            dist_pump_on: true,
            q_out_sp: 150.0,
            ..Controls::default()
        };
        run(&mut state, &controls, 120.0);
        assert!(state.level_clearwell >= 0.0);
    }

    #[test]
    fn q_out_setpoint_is_capped_at_pump_capacity() {
        let mut state = PlantState::default();
        let controls = Controls {
            dist_pump_on: true,
            q_out_sp: 150.0,
            ..Controls::default()
        };
        run(&mut state, &controls, 60.0);
        assert!(state.q_out <= DIST_PUMP_CAPACITY + 1e-9);
        assert!((state.q_out - DIST_PUMP_CAPACITY).abs() < 2.0);
    }

    #[test]
    fn health_only_decreases_under_the_tick() {
        let mut state = PlantState::default();
        let controls = Controls {
            wellfield_on: true,
            valve_101_open: false,
            ro_feed_pump_on: true,
            valve_201_open: false,
            dist_pump_on: true,
            valve_401_open: false,
            ..Controls::default()
        };
        let mut previous = state.health.clone();
        let mut time = 0.0;
        for _ in 0..600 {
            step(&mut state, &controls, time, DT);
            time += DT;
            let h = &state.health;
            assert!(h.membrane <= previous.membrane);
            assert!(h.pump_well <= previous.pump_well);
            assert!(h.pump_feed <= previous.pump_feed);
            assert!(h.pump_dist <= previous.pump_dist);
            assert!(h.pipe_well <= previous.pipe_well);
            assert!(h.pipe_feed <= previous.pipe_feed);
            assert!(h.pipe_dist <= previous.pipe_dist);
            assert!(h.membrane >= 0.0 && h.membrane <= 100.0);
            previous = state.health.clone();
        }
    }

    #[test]
    fn stagnant_chlorination_drives_residual_toward_fifty() {
        let mut state = PlantState::default();
        let controls = Controls {
            cl_pump_on: true,
            cl_dose: 2.0,
            ..Controls::default()
        };
        run(&mut state, &controls, 30.0);
        assert!(state.cl > 45.0, "Cl_true = {}", state.cl);
    }

    #[test]
    fn flowing_chlorination_tracks_ninety_percent_of_dose() {
        let mut state = PlantState::default();
        let controls = Controls {
            wellfield_on: true,
            ro_feed_pump_on: true,
            cl_pump_on: true,
            cl_dose: 2.0,
            ..Controls::default()
        };
        run(&mut state, &controls, 60.0);
        assert!((state.cl - 1.8).abs() < 0.1, "Cl_true = {}", state.cl);
    }

    #[test]
    fn naoh_dosing_shifts_ph() {
        let mut state = PlantState::default();
        let controls = Controls {
            naoh_pump_on: true,
            naoh_dose: 10.0,
            ..Controls::default()
        };
        step(&mut state, &controls, 0.0, DT);
        assert_eq!(state.ph, 8.5);

        let controls = Controls::default();
        step(&mut state, &controls, 0.0, DT);
        assert_eq!(state.ph, 7.0);
    }

    #[test]
    fn ruptured_membrane_collapses_dp_and_rejection() {
        let mut state = PlantState::default();
        let controls = Controls {
            wellfield_on: true,
            ro_feed_pump_on: true,
            ..Controls::default()
        };
        run(&mut state, &controls, 60.0);
        let healthy_dp = state.dp_ro;
        let healthy_tds = state.tds_perm;
        assert!(healthy_dp > 1.5);

        state.health.membrane = 10.0;
        run(&mut state, &controls, 5.0);
        assert!(state.dp_ro < healthy_dp * 0.3);
        assert!(state.tds_perm > healthy_tds * 10.0);
    }

    #[test]
    fn tds_feed_follows_a_slow_diurnal_baseline() {
        let mut state = PlantState::default();
        let controls = Controls::default();
        step(&mut state, &controls, 0.0, DT);
        let at_start = state.tds_feed;
        step(&mut state, &controls, 21_600.0, DT);
        let at_quarter_day = state.tds_feed;
        assert!((at_start - TDS_FEED_BASE).abs() < 1.0);
        assert!((at_quarter_day - (TDS_FEED_BASE + TDS_FEED_AMP)).abs() < 1.0);
    }

    #[test]
    fn non_finite_state_is_restored_to_the_last_value() {
        let mut state = PlantState::default();
        state.pressure_feed = f64::NAN;
        let controls = Controls::default();
        step(&mut state, &controls, 0.0, DT);
        assert!(state.pressure_feed.is_finite());
    }
}
