// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Canonical Modbus register map for the plant twin.
//!
//! This module is the single binding between symbolic plant signals and the
//! coil/holding-register addresses exposed over Modbus TCP. The tables are
//! normative for every external consumer (Modbus clients, the dashboard, the
//! in-browser fallback model):
//!
//! ## Coils (FC 01/05/15, read-write)
//!
//! | Addr | Signal |
//! |------|--------|
//! | 0 | wellfield_on |
//! | 1 | ro_feed_pump_on |
//! | 2 | dist_pump_on |
//! | 3 | valve_101_open |
//! | 4 | valve_201_open |
//! | 5 | valve_202_open |
//! | 6 | valve_203_open |
//! | 7 | valve_401_open |
//! | 8 | naoh_pump_on |
//! | 9 | cl_pump_on |
//!
//! ## Holding registers (FC 03/06/16)
//!
//! | Addr | Signal | Scale | Access |
//! |------|--------|-------|--------|
//! | 0 | NaOH_dose | ÷10 | RW, raw 0..=200 |
//! | 1 | Cl_dose | ÷10 | RW, raw 0..=50 |
//! | 2 | Q_out_sp | ÷1 | RW, raw 0..=150 |
//! | 10..=14 | Q_wellfield, Q_feed, Q_perm, Q_brine, Q_out | ÷1 | RO |
//! | 15..=16 | level_feed_tank, level_clearwell | ÷100 | RO |
//! | 17..=19 | pressure_well, pressure_feed, pressure_dist | ÷10 | RO |
//! | 20 | dP_ro_true | ÷100 | RO |
//! | 21..=22 | TDS_feed, TDS_perm | ÷1 | RO |
//! | 23 | pH_true | ÷100 | RO |
//! | 24 | Cl_true | ÷100 | RO |
//! | 30..=36 | membrane/pump/pipe health | ÷10 | RO |
//!
//! The scale is an integer divisor applied to the raw wire value, so the
//! engineering value is `raw / scale` and the wire value is
//! `round(value * scale)`. All registers are big-endian 16-bit unsigned,
//! which the tokio-modbus codec handles for us.

use std::fmt;
use std::str::FromStr;

/// Number of mapped coils (addresses `0..COIL_COUNT`).
pub const COIL_COUNT: u16 = 10;

/// Closed set of writable control signals.
///
/// Every external write path (Modbus coil/register writes, `POST /sync`)
/// resolves to one of these before touching the simulation, so an unknown
/// key is a schema error at the edge rather than a silent dictionary insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKey {
    WellfieldOn,
    RoFeedPumpOn,
    DistPumpOn,
    Valve101Open,
    Valve201Open,
    Valve202Open,
    Valve203Open,
    Valve401Open,
    NaohPumpOn,
    ClPumpOn,
    NaohDose,
    ClDose,
    QOutSp,
}

impl ControlKey {
    /// True for the on/off controls (pumps and valves).
    pub fn is_boolean(self) -> bool {
        !matches!(
            self,
            ControlKey::NaohDose | ControlKey::ClDose | ControlKey::QOutSp
        )
    }

    /// Declared engineering range for the numeric setpoints.
    pub fn range(self) -> Option<(f64, f64)> {
        match self {
            ControlKey::NaohDose => Some((0.0, 20.0)),
            ControlKey::ClDose => Some((0.0, 5.0)),
            ControlKey::QOutSp => Some((0.0, 150.0)),
            _ => None,
        }
    }

    /// Canonical signal name as used on the JSON surface.
    pub fn as_str(self) -> &'static str {
        match self {
            ControlKey::WellfieldOn => "wellfield_on",
            ControlKey::RoFeedPumpOn => "ro_feed_pump_on",
            ControlKey::DistPumpOn => "dist_pump_on",
            ControlKey::Valve101Open => "valve_101_open",
            ControlKey::Valve201Open => "valve_201_open",
            ControlKey::Valve202Open => "valve_202_open",
            ControlKey::Valve203Open => "valve_203_open",
            ControlKey::Valve401Open => "valve_401_open",
            ControlKey::NaohPumpOn => "naoh_pump_on",
            ControlKey::ClPumpOn => "cl_pump_on",
            ControlKey::NaohDose => "NaOH_dose",
            ControlKey::ClDose => "Cl_dose",
            ControlKey::QOutSp => "Q_out_sp",
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a control signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownControl(pub String);

impl fmt::Display for UnknownControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown control key '{}'", self.0)
    }
}

impl std::error::Error for UnknownControl {}

impl FromStr for ControlKey {
    type Err = UnknownControl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wellfield_on" => Ok(ControlKey::WellfieldOn),
            "ro_feed_pump_on" => Ok(ControlKey::RoFeedPumpOn),
            "dist_pump_on" => Ok(ControlKey::DistPumpOn),
            "valve_101_open" => Ok(ControlKey::Valve101Open),
            "valve_201_open" => Ok(ControlKey::Valve201Open),
            "valve_202_open" => Ok(ControlKey::Valve202Open),
            "valve_203_open" => Ok(ControlKey::Valve203Open),
            "valve_401_open" => Ok(ControlKey::Valve401Open),
            "naoh_pump_on" => Ok(ControlKey::NaohPumpOn),
            "cl_pump_on" => Ok(ControlKey::ClPumpOn),
            "NaOH_dose" => Ok(ControlKey::NaohDose),
            "Cl_dose" => Ok(ControlKey::ClDose),
            "Q_out_sp" => Ok(ControlKey::QOutSp),
            other => Err(UnknownControl(other.to_string())),
        }
    }
}

/// Resolve a coil address to its control signal. `None` for unmapped coils.
pub fn coil(addr: u16) -> Option<ControlKey> {
    match addr {
        0 => Some(ControlKey::WellfieldOn),
        1 => Some(ControlKey::RoFeedPumpOn),
        2 => Some(ControlKey::DistPumpOn),
        3 => Some(ControlKey::Valve101Open),
        4 => Some(ControlKey::Valve201Open),
        5 => Some(ControlKey::Valve202Open),
        6 => Some(ControlKey::Valve203Open),
        7 => Some(ControlKey::Valve401Open),
        8 => Some(ControlKey::NaohPumpOn),
        9 => Some(ControlKey::ClPumpOn),
        _ => None,
    }
}

/// What a holding register exposes: a writable setpoint or a read-only
/// process variable / health scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingSignal {
    Setpoint(ControlKey),
    QWellfield,
    QFeed,
    QPerm,
    QBrine,
    QOut,
    LevelFeedTank,
    LevelClearwell,
    PressureWell,
    PressureFeed,
    PressureDist,
    DpRo,
    TdsFeed,
    TdsPerm,
    Ph,
    Cl,
    MembraneHealth,
    PumpWellHealth,
    PumpFeedHealth,
    PumpDistHealth,
    PipeWellHealth,
    PipeFeedHealth,
    PipeDistHealth,
}

/// One row of the holding-register table.
#[derive(Debug, Clone, Copy)]
pub struct HoldingReg {
    pub name: &'static str,
    /// Integer divisor applied to the raw wire value.
    pub scale: f64,
    pub writable: bool,
    /// Largest raw value accepted on write. Only meaningful for writable
    /// registers; writes above it get Modbus exception 03.
    pub wire_max: u16,
    pub signal: HoldingSignal,
}

const fn rw(name: &'static str, scale: f64, wire_max: u16, key: ControlKey) -> HoldingReg {
    HoldingReg {
        name,
        scale,
        writable: true,
        wire_max,
        signal: HoldingSignal::Setpoint(key),
    }
}

const fn ro(name: &'static str, scale: f64, signal: HoldingSignal) -> HoldingReg {
    HoldingReg {
        name,
        scale,
        writable: false,
        wire_max: u16::MAX,
        signal,
    }
}

/// Resolve a holding-register address. `None` for unmapped addresses,
/// including the gaps at 3..=9 and 25..=29.
pub fn holding(addr: u16) -> Option<HoldingReg> {
    let reg = match addr {
        0 => rw("NaOH_dose", 10.0, 200, ControlKey::NaohDose),
        1 => rw("Cl_dose", 10.0, 50, ControlKey::ClDose),
        2 => rw("Q_out_sp", 1.0, 150, ControlKey::QOutSp),
        10 => ro("Q_wellfield", 1.0, HoldingSignal::QWellfield),
        11 => ro("Q_feed", 1.0, HoldingSignal::QFeed),
        12 => ro("Q_perm", 1.0, HoldingSignal::QPerm),
        13 => ro("Q_brine", 1.0, HoldingSignal::QBrine),
        14 => ro("Q_out", 1.0, HoldingSignal::QOut),
        15 => ro("level_feed_tank", 100.0, HoldingSignal::LevelFeedTank),
        16 => ro("level_clearwell", 100.0, HoldingSignal::LevelClearwell),
        17 => ro("pressure_well", 10.0, HoldingSignal::PressureWell),
        18 => ro("pressure_feed", 10.0, HoldingSignal::PressureFeed),
        19 => ro("pressure_dist", 10.0, HoldingSignal::PressureDist),
        20 => ro("dP_ro_true", 100.0, HoldingSignal::DpRo),
        21 => ro("TDS_feed", 1.0, HoldingSignal::TdsFeed),
        22 => ro("TDS_perm", 1.0, HoldingSignal::TdsPerm),
        23 => ro("pH_true", 100.0, HoldingSignal::Ph),
        24 => ro("Cl_true", 100.0, HoldingSignal::Cl),
        30 => ro("membrane_health", 10.0, HoldingSignal::MembraneHealth),
        31 => ro("pump_well_health", 10.0, HoldingSignal::PumpWellHealth),
        32 => ro("pump_feed_health", 10.0, HoldingSignal::PumpFeedHealth),
        33 => ro("pump_dist_health", 10.0, HoldingSignal::PumpDistHealth),
        34 => ro("pipe_well_health", 10.0, HoldingSignal::PipeWellHealth),
        35 => ro("pipe_feed_health", 10.0, HoldingSignal::PipeFeedHealth),
        36 => ro("pipe_dist_health", 10.0, HoldingSignal::PipeDistHealth),
        _ => return None,
    };
    Some(reg)
}

/// Convert an engineering value to its raw wire representation.
pub fn encode(value: f64, scale: f64) -> u16 {
    (value.max(0.0) * scale).round().min(f64::from(u16::MAX)) as u16
}

/// Convert a raw wire value back to engineering units.
pub fn decode(raw: u16, scale: f64) -> f64 {
    f64::from(raw) / scale
}
