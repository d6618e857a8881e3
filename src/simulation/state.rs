// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared simulation state for the plant twin.
//!
//! This module provides the single source of truth mutated by the tick loop
//! and the network write paths. All concurrent access goes through
//! [`SharedPlantState`]; readers clone a snapshot under the lock and
//! serialize after releasing it.

use std::fmt;
use std::sync::{Arc, RwLock};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::registers::ControlKey;
use crate::simulation::{physics, sensors};

/// Actuated inputs: pump/valve switches and numeric setpoints.
///
/// Cold-start defaults are "safe initial": every pump off, every valve open,
/// setpoints at zero.
#[derive(Debug, Clone, Serialize)]
pub struct Controls {
    pub wellfield_on: bool,
    pub ro_feed_pump_on: bool,
    pub dist_pump_on: bool,
    pub valve_101_open: bool,
    pub valve_201_open: bool,
    pub valve_202_open: bool,
    pub valve_203_open: bool,
    pub valve_401_open: bool,
    pub naoh_pump_on: bool,
    pub cl_pump_on: bool,
    /// NaOH dose setpoint, mg/L.
    #[serde(rename = "NaOH_dose")]
    pub naoh_dose: f64,
    /// Chlorine dose setpoint, mg/L.
    #[serde(rename = "Cl_dose")]
    pub cl_dose: f64,
    /// Distribution flow setpoint, m³/h.
    #[serde(rename = "Q_out_sp")]
    pub q_out_sp: f64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            wellfield_on: false,
            ro_feed_pump_on: false,
            dist_pump_on: false,
            valve_101_open: true,
            valve_201_open: true,
            valve_202_open: true,
            valve_203_open: true,
            valve_401_open: true,
            naoh_pump_on: false,
            cl_pump_on: false,
            naoh_dose: 0.0,
            cl_dose: 0.0,
            q_out_sp: 0.0,
        }
    }
}

impl Controls {
    /// Current value of a boolean control. `None` for the numeric setpoints.
    pub fn switch(&self, key: ControlKey) -> Option<bool> {
        match key {
            ControlKey::WellfieldOn => Some(self.wellfield_on),
            ControlKey::RoFeedPumpOn => Some(self.ro_feed_pump_on),
            ControlKey::DistPumpOn => Some(self.dist_pump_on),
            ControlKey::Valve101Open => Some(self.valve_101_open),
            ControlKey::Valve201Open => Some(self.valve_201_open),
            ControlKey::Valve202Open => Some(self.valve_202_open),
            ControlKey::Valve203Open => Some(self.valve_203_open),
            ControlKey::Valve401Open => Some(self.valve_401_open),
            ControlKey::NaohPumpOn => Some(self.naoh_pump_on),
            ControlKey::ClPumpOn => Some(self.cl_pump_on),
            _ => None,
        }
    }

    /// Current value of a numeric setpoint. `None` for the on/off controls.
    pub fn setpoint(&self, key: ControlKey) -> Option<f64> {
        match key {
            ControlKey::NaohDose => Some(self.naoh_dose),
            ControlKey::ClDose => Some(self.cl_dose),
            ControlKey::QOutSp => Some(self.q_out_sp),
            _ => None,
        }
    }
}

/// Persistent equipment health, % in [0, 100]. Monotone non-increasing
/// except through [`PlantTwin::reset_damage`].
#[derive(Debug, Clone)]
pub struct Health {
    pub membrane: f64,
    pub pump_well: f64,
    pub pump_feed: f64,
    pub pump_dist: f64,
    pub pipe_well: f64,
    pub pipe_feed: f64,
    pub pipe_dist: f64,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            membrane: 100.0,
            pump_well: 100.0,
            pump_feed: 100.0,
            pump_dist: 100.0,
            pipe_well: 100.0,
            pipe_feed: 100.0,
            pipe_dist: 100.0,
        }
    }
}

/// Integrated physical truth of the plant. Sensor jitter never touches these
/// fields; what the outside world sees is the derived [`StateView`].
#[derive(Debug, Clone)]
pub struct PlantState {
    /// Flows, m³/h.
    pub q_wellfield: f64,
    pub q_feed: f64,
    pub q_perm: f64,
    pub q_brine: f64,
    pub q_out: f64,
    /// Tank levels, m.
    pub level_feed_tank: f64,
    pub level_clearwell: f64,
    /// Pressures, bar.
    pub pressure_well: f64,
    pub pressure_feed: f64,
    pub pressure_dist: f64,
    /// RO differential pressure, bar.
    pub dp_ro: f64,
    /// Conductivity, µS/cm.
    pub tds_feed: f64,
    pub tds_perm: f64,
    pub ph: f64,
    /// Residual chlorine, mg/L.
    pub cl: f64,
    pub health: Health,
}

impl Default for PlantState {
    fn default() -> Self {
        Self {
            q_wellfield: 0.0,
            q_feed: 0.0,
            q_perm: 0.0,
            q_brine: 0.0,
            q_out: 0.0,
            level_feed_tank: 2.5,
            level_clearwell: 3.0,
            pressure_well: 0.0,
            pressure_feed: 0.0,
            pressure_dist: 0.0,
            dp_ro: 0.0,
            tds_feed: 1250.0,
            tds_perm: 25.0,
            ph: 7.2,
            cl: 0.0,
            health: Health::default(),
        }
    }
}

/// Published process variables: the integrated state as seen through the
/// simulated instrumentation (jittered read-outs, health exact). Field names
/// follow the register map so every consumer speaks the same vocabulary.
#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    #[serde(rename = "Q_wellfield")]
    pub q_wellfield: f64,
    #[serde(rename = "Q_feed")]
    pub q_feed: f64,
    #[serde(rename = "Q_perm")]
    pub q_perm: f64,
    #[serde(rename = "Q_brine")]
    pub q_brine: f64,
    #[serde(rename = "Q_out")]
    pub q_out: f64,
    pub level_feed_tank: f64,
    pub level_clearwell: f64,
    pub pressure_well: f64,
    pub pressure_feed: f64,
    pub pressure_dist: f64,
    #[serde(rename = "dP_ro_true")]
    pub dp_ro: f64,
    #[serde(rename = "TDS_feed")]
    pub tds_feed: f64,
    #[serde(rename = "TDS_perm")]
    pub tds_perm: f64,
    #[serde(rename = "pH_true")]
    pub ph: f64,
    #[serde(rename = "Cl_true")]
    pub cl: f64,
    pub membrane_health: f64,
    pub pump_well_health: f64,
    pub pump_feed_health: f64,
    pub pump_dist_health: f64,
    pub pipe_well_health: f64,
    pub pipe_feed_health: f64,
    pub pipe_dist_health: f64,
}

/// A consistent copy of the published state and live controls, safe to
/// serialize outside any lock.
#[derive(Debug, Clone, Serialize)]
pub struct PlantSnapshot {
    pub time_s: f64,
    pub state: StateView,
    pub controls: Controls,
}

/// Value carried by a control write after edge validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    Switch(bool),
    Number(f64),
}

/// Rejected control write. No state change has happened when this is
/// returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// Boolean control written with a number or vice versa.
    TypeMismatch { key: ControlKey },
    /// Numeric setpoint written with NaN or infinity.
    NotFinite { key: ControlKey },
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::TypeMismatch { key } => {
                write!(f, "control '{}' written with the wrong value type", key)
            }
            ControlError::NotFinite { key } => {
                write!(f, "control '{}' written with a non-finite value", key)
            }
        }
    }
}

impl std::error::Error for ControlError {}

/// The plant twin: simulation time, controls, integrated state and the
/// published sensor view, plus the seeded jitter source.
#[derive(Debug)]
pub struct PlantTwin {
    time_s: f64,
    controls: Controls,
    state: PlantState,
    published: StateView,
    rng: StdRng,
}

impl PlantTwin {
    pub fn new(noise_seed: u64) -> Self {
        let controls = Controls::default();
        let state = PlantState::default();
        let mut rng = StdRng::seed_from_u64(noise_seed);
        let published = sensors::emit(&state, &mut rng);
        Self {
            time_s: 0.0,
            controls,
            state,
            published,
            rng,
        }
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn state(&self) -> &PlantState {
        &self.state
    }

    pub fn published(&self) -> &StateView {
        &self.published
    }

    /// Advance the plant by one fixed step and refresh the published view.
    pub fn tick(&mut self, dt: f64) {
        physics::step(&mut self.state, &self.controls, self.time_s, dt);
        self.time_s += dt;
        self.published = sensors::emit(&self.state, &mut self.rng);
    }

    /// Validate and store one control write. Numeric setpoints are clamped
    /// into their declared range; booleans are stored as-is.
    pub fn apply_control(
        &mut self,
        key: ControlKey,
        value: ControlValue,
    ) -> Result<(), ControlError> {
        match value {
            ControlValue::Switch(on) => {
                let slot = match key {
                    ControlKey::WellfieldOn => &mut self.controls.wellfield_on,
                    ControlKey::RoFeedPumpOn => &mut self.controls.ro_feed_pump_on,
                    ControlKey::DistPumpOn => &mut self.controls.dist_pump_on,
                    ControlKey::Valve101Open => &mut self.controls.valve_101_open,
                    ControlKey::Valve201Open => &mut self.controls.valve_201_open,
                    ControlKey::Valve202Open => &mut self.controls.valve_202_open,
                    ControlKey::Valve203Open => &mut self.controls.valve_203_open,
                    ControlKey::Valve401Open => &mut self.controls.valve_401_open,
                    ControlKey::NaohPumpOn => &mut self.controls.naoh_pump_on,
                    ControlKey::ClPumpOn => &mut self.controls.cl_pump_on,
                    _ => return Err(ControlError::TypeMismatch { key }),
                };
                *slot = on;
            }
            ControlValue::Number(raw) => {
                if !raw.is_finite() {
                    return Err(ControlError::NotFinite { key });
                }
                let slot = match key {
                    ControlKey::NaohDose => &mut self.controls.naoh_dose,
                    ControlKey::ClDose => &mut self.controls.cl_dose,
                    ControlKey::QOutSp => &mut self.controls.q_out_sp,
                    _ => return Err(ControlError::TypeMismatch { key }),
                };
                // Every numeric setpoint declares a range.
                let (lo, hi) = key.range().unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
                *slot = raw.clamp(lo, hi);
            }
        }
        Ok(())
    }

    /// Consistent copy for publication: last tick's sensor view plus the
    /// live controls, so a completed write is visible to the next snapshot.
    pub fn snapshot(&self) -> PlantSnapshot {
        PlantSnapshot {
            time_s: self.time_s,
            state: self.published.clone(),
            controls: self.controls.clone(),
        }
    }

    /// Restore every health scalar to exactly 100. Nothing else changes.
    pub fn reset_damage(&mut self) {
        self.state.health = Health::default();
        self.published.membrane_health = 100.0;
        self.published.pump_well_health = 100.0;
        self.published.pump_feed_health = 100.0;
        self.published.pump_dist_health = 100.0;
        self.published.pipe_well_health = 100.0;
        self.published.pipe_feed_health = 100.0;
        self.published.pipe_dist_health = 100.0;
    }
}

/// Handle shared between the tick driver and the network servers.
pub type SharedPlantState = Arc<RwLock<PlantTwin>>;

/// Create a fresh plant behind the shared lock.
pub fn create_shared_plant(noise_seed: u64) -> SharedPlantState {
    Arc::new(RwLock::new(PlantTwin::new(noise_seed)))
}
