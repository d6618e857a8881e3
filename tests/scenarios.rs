// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end hazard scenarios, run from the default cold-start state at
//! dt = 0.1 s. Each one mirrors a documented training attack and asserts
//! the plant reaches the expected damage signature.

use wtp_twin::registers::ControlKey;
use wtp_twin::simulation::{ControlValue, PlantTwin};

const DT: f64 = 0.1;

fn set_switch(twin: &mut PlantTwin, key: ControlKey, on: bool) {
    twin.apply_control(key, ControlValue::Switch(on)).unwrap();
}

fn set_number(twin: &mut PlantTwin, key: ControlKey, value: f64) {
    twin.apply_control(key, ControlValue::Number(value)).unwrap();
}

fn run(twin: &mut PlantTwin, seconds: f64) {
    let ticks = (seconds / DT).round() as u64;
    for _ in 0..ticks {
        twin.tick(DT);
    }
}

/// P-201 deadhead: feed pump running against closed RO block valves.
#[test]
fn ro_feed_deadhead_wrecks_pipe_and_membrane() {
    let mut twin = PlantTwin::new(1);
    set_switch(&mut twin, ControlKey::RoFeedPumpOn, true);
    set_switch(&mut twin, ControlKey::Valve201Open, true);
    set_switch(&mut twin, ControlKey::Valve202Open, false);
    set_switch(&mut twin, ControlKey::Valve203Open, false);

    run(&mut twin, 65.0);

    let state = twin.state();
    assert!(state.pressure_feed > 20.0, "pressure_feed = {}", state.pressure_feed);
    assert!(state.q_feed < 1.0, "Q_feed = {}", state.q_feed);
    assert!(
        state.health.membrane < 40.0,
        "membrane_health = {}",
        state.health.membrane
    );
    assert!(
        state.health.pipe_feed < 70.0,
        "pipe_feed_health = {}",
        state.health.pipe_feed
    );
}

/// Tank depletion: feed pump left running with the wellfield off until the
/// suction head is gone, then cavitation chews through the pump.
#[test]
fn tank_depletion_cavitates_the_feed_pump() {
    let mut twin = PlantTwin::new(1);
    set_switch(&mut twin, ControlKey::WellfieldOn, false);
    set_switch(&mut twin, ControlKey::RoFeedPumpOn, true);

    // Drain from 2.5 m down to the suction limit; ~100 m³/h out of a 10 m²
    // tank takes around 830 s. Cap the wait so a regression cannot hang.
    let mut waited = 0.0;
    while twin.state().level_feed_tank >= 0.2 && waited < 2000.0 {
        run(&mut twin, 10.0);
        waited += 10.0;
    }
    assert!(
        twin.state().level_feed_tank < 0.2,
        "feed tank never depleted, level = {}",
        twin.state().level_feed_tank
    );

    let before = twin.state().health.pump_feed;
    run(&mut twin, 30.0);
    let after = twin.state().health.pump_feed;
    assert!(
        before - after >= 14.0,
        "pump_feed_health only dropped {:.1} % in 30 s",
        before - after
    );
}

/// Chlorine attack: dosing ahead of a flowing membrane destroys rejection.
#[test]
fn chlorine_attack_destroys_the_membrane() {
    let mut twin = PlantTwin::new(1);
    set_switch(&mut twin, ControlKey::RoFeedPumpOn, true);
    set_switch(&mut twin, ControlKey::Valve101Open, true);
    set_switch(&mut twin, ControlKey::Valve201Open, true);
    set_switch(&mut twin, ControlKey::Valve202Open, true);
    set_switch(&mut twin, ControlKey::Valve203Open, true);
    set_switch(&mut twin, ControlKey::ClPumpOn, true);
    set_number(&mut twin, ControlKey::ClDose, 5.0);

    run(&mut twin, 480.0);

    let state = twin.state();
    assert!(state.cl >= 0.1, "Cl_true = {}", state.cl);
    assert!(
        state.health.membrane <= 20.0,
        "membrane_health = {}, expected a loss of at least 80 %",
        state.health.membrane
    );
    assert!(
        state.tds_perm > 100.0,
        "TDS_perm = {}, rejection should have collapsed",
        state.tds_perm
    );
    assert!(
        (state.tds_feed - 1250.0).abs() < 100.0,
        "TDS_feed = {}",
        state.tds_feed
    );
}

/// Overflow: wellfield filling the feed tank with the RO train stopped.
/// The level clamps at the tank ceiling and excess mass is discarded.
#[test]
fn feed_tank_overflow_clamps_at_the_ceiling() {
    let mut twin = PlantTwin::new(1);
    set_switch(&mut twin, ControlKey::WellfieldOn, true);
    set_switch(&mut twin, ControlKey::RoFeedPumpOn, false);
    set_switch(&mut twin, ControlKey::Valve101Open, true);

    let mut previous = twin.state().level_feed_tank;
    let mut waited = 0.0;
    while waited < 1200.0 {
        run(&mut twin, 10.0);
        waited += 10.0;
        let level = twin.state().level_feed_tank;
        assert!(level >= previous - 1e-9, "level decreased during fill");
        assert!(level <= 5.0, "level exceeded the tank ceiling: {}", level);
        previous = level;
    }
    assert_eq!(twin.state().level_feed_tank, 5.0);

    // Still clamped after more inflow.
    run(&mut twin, 60.0);
    assert_eq!(twin.state().level_feed_tank, 5.0);
}

/// Wellfield deadhead: pressure spike past 10 bar plus pump wear.
#[test]
fn wellfield_deadhead_overpressures_the_raw_line() {
    let mut twin = PlantTwin::new(1);
    set_switch(&mut twin, ControlKey::WellfieldOn, true);
    set_switch(&mut twin, ControlKey::Valve101Open, false);

    run(&mut twin, 30.0);

    let state = twin.state();
    assert!(state.pressure_well > 10.0);
    assert!(state.health.pump_well < 100.0 - 0.3 * 25.0);
    assert!(state.health.pipe_well < 100.0);
}

/// Damage reset restores every health scalar to exactly 100 and leaves the
/// hydraulic state alone; a second reset changes nothing further.
#[test]
fn reset_damage_restores_health_and_nothing_else() {
    let mut twin = PlantTwin::new(1);
    set_switch(&mut twin, ControlKey::RoFeedPumpOn, true);
    set_switch(&mut twin, ControlKey::Valve202Open, false);
    set_switch(&mut twin, ControlKey::Valve203Open, false);
    run(&mut twin, 60.0);
    assert!(twin.state().health.membrane < 100.0);

    let level_before = twin.state().level_feed_tank;
    let pressure_before = twin.state().pressure_feed;

    twin.reset_damage();
    let health = twin.state().health.clone();
    assert_eq!(health.membrane, 100.0);
    assert_eq!(health.pump_well, 100.0);
    assert_eq!(health.pump_feed, 100.0);
    assert_eq!(health.pump_dist, 100.0);
    assert_eq!(health.pipe_well, 100.0);
    assert_eq!(health.pipe_feed, 100.0);
    assert_eq!(health.pipe_dist, 100.0);
    assert_eq!(twin.state().level_feed_tank, level_before);
    assert_eq!(twin.state().pressure_feed, pressure_before);

    twin.reset_damage();
    assert_eq!(twin.state().health.membrane, 100.0);
}

/// The mass-balance identity holds on every tick of a busy plant.
#[test]
fn permeate_and_brine_always_sum_to_feed() {
    let mut twin = PlantTwin::new(1);
    set_switch(&mut twin, ControlKey::WellfieldOn, true);
    set_switch(&mut twin, ControlKey::RoFeedPumpOn, true);
    set_switch(&mut twin, ControlKey::DistPumpOn, true);
    set_number(&mut twin, ControlKey::QOutSp, 90.0);

    for _ in 0..3000 {
        twin.tick(DT);
        let state = twin.state();
        assert!((state.q_feed - (state.q_perm + state.q_brine)).abs() < 1e-9);
        assert!(state.level_feed_tank >= 0.0 && state.level_feed_tank <= 5.0);
        assert!(state.level_clearwell >= 0.0 && state.level_clearwell <= 6.0);
    }
}
