// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server for the plant twin.
//!
//! For avoiding confusion with the Modbus master/slave terminology, this
//! module uses the terms "server" and "client": the server is the plant twin
//! answering requests, the clients are PLC tooling, attack scripts or the
//! dashboard bridge. The register layout served here is defined in
//! [`crate::registers`].
//!
//! Supported function codes:
//!
//! | FC | Meaning | Addresses |
//! |----|---------|-----------|
//! | 01 | Read coils | 0–9 |
//! | 03 | Read holding registers | 0–2, 10–24, 30–36 |
//! | 05 | Write single coil | 0–9 |
//! | 06 | Write single register | 0–2 |
//! | 15 | Write multiple coils | 0–9 |
//! | 16 | Write multiple registers | 0–2 |
//!
//! Everything else answers exception 01 (illegal function). Unmapped
//! addresses — including the holding-register gaps — answer exception 02,
//! and so do writes aimed at the read-only process-variable and health
//! registers. Raw setpoint values above the register's declared range
//! answer exception 03.

use std::future;

use log::{debug, error};

use tokio_modbus::prelude::*;

use crate::registers::{self, ControlKey, HoldingSignal};
use crate::simulation::{ControlValue, PlantTwin, SharedPlantState, StateView};

/// A Modbus TCP service answering against the shared plant state.
///
/// One instance is created per client connection; all instances share the
/// same plant, so a coil written by one client is read back by every other.
/// Each request takes the state lock exactly once, which keeps reads
/// consistent across a multi-register frame (no torn reads across a tick).
pub struct WaterPlantModbusServer {
    plant: SharedPlantState,
}

impl WaterPlantModbusServer {
    pub fn new(plant: SharedPlantState) -> Self {
        Self { plant }
    }

    fn read_coils(&self, addr: u16, cnt: u16) -> Result<Vec<bool>, ExceptionCode> {
        let twin = self.plant.read().unwrap();
        let mut values = Vec::with_capacity(cnt as usize);
        for i in 0..cnt {
            let key = mapped_coil(addr, i)?;
            // Mapped coils are all boolean controls.
            values.push(twin.controls().switch(key).unwrap_or(false));
        }
        Ok(values)
    }

    fn read_holding(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        let twin = self.plant.read().unwrap();
        let mut values = Vec::with_capacity(cnt as usize);
        for i in 0..cnt {
            let reg_addr = checked_addr(addr, i)?;
            let Some(reg) = registers::holding(reg_addr) else {
                error!(
                    "Exception::IllegalDataAddress - holding register {} not mapped",
                    reg_addr
                );
                return Err(ExceptionCode::IllegalDataAddress);
            };
            values.push(registers::encode(signal_value(&twin, reg.signal), reg.scale));
        }
        Ok(values)
    }

    fn write_coils(&self, addr: u16, values: &[bool]) -> Result<(), ExceptionCode> {
        // Resolve every address before applying anything so an invalid frame
        // leaves the controls untouched.
        let mut writes = Vec::with_capacity(values.len());
        for (i, on) in values.iter().enumerate() {
            let key = mapped_coil(addr, i as u16)?;
            writes.push((key, *on));
        }

        let mut twin = self.plant.write().unwrap();
        for (key, on) in writes {
            apply(&mut twin, key, ControlValue::Switch(on))?;
            debug!("coil write: {} <- {}", key, on);
        }
        Ok(())
    }

    fn write_holding(&self, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        let mut writes = Vec::with_capacity(values.len());
        for (i, raw) in values.iter().enumerate() {
            let reg_addr = checked_addr(addr, i as u16)?;
            let Some(reg) = registers::holding(reg_addr) else {
                error!(
                    "Exception::IllegalDataAddress - holding register {} not mapped",
                    reg_addr
                );
                return Err(ExceptionCode::IllegalDataAddress);
            };
            let key = match reg.signal {
                HoldingSignal::Setpoint(key) if reg.writable => key,
                _ => {
                    error!(
                        "Exception::IllegalDataAddress - register {} ({}) is read-only",
                        reg_addr, reg.name
                    );
                    return Err(ExceptionCode::IllegalDataAddress);
                }
            };
            if *raw > reg.wire_max {
                error!(
                    "Exception::IllegalDataValue - raw value {} exceeds {} for {}",
                    raw, reg.wire_max, reg.name
                );
                return Err(ExceptionCode::IllegalDataValue);
            }
            writes.push((key, registers::decode(*raw, reg.scale)));
        }

        let mut twin = self.plant.write().unwrap();
        for (key, value) in writes {
            apply(&mut twin, key, ControlValue::Number(value))?;
            debug!("register write: {} <- {}", key, value);
        }
        Ok(())
    }
}

impl tokio_modbus::server::Service for WaterPlantModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadCoils(addr, cnt) => self.read_coils(addr, cnt).map(Response::ReadCoils),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .read_holding(addr, cnt)
                .map(Response::ReadHoldingRegisters),
            Request::WriteSingleCoil(addr, on) => self
                .write_coils(addr, std::slice::from_ref(&on))
                .map(|_| Response::WriteSingleCoil(addr, on)),
            Request::WriteMultipleCoils(addr, coils) => self
                .write_coils(addr, &coils)
                .map(|_| Response::WriteMultipleCoils(addr, coils.len() as u16)),
            Request::WriteSingleRegister(addr, value) => self
                .write_holding(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => self
                .write_holding(addr, &values)
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            _ => {
                error!(
                    "Exception::IllegalFunction - unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

fn checked_addr(base: u16, offset: u16) -> Result<u16, ExceptionCode> {
    base.checked_add(offset).ok_or_else(|| {
        error!("Exception::IllegalDataAddress - address overflow past {}", base);
        ExceptionCode::IllegalDataAddress
    })
}

fn mapped_coil(base: u16, offset: u16) -> Result<ControlKey, ExceptionCode> {
    let addr = checked_addr(base, offset)?;
    registers::coil(addr).ok_or_else(|| {
        error!("Exception::IllegalDataAddress - coil {} not mapped", addr);
        ExceptionCode::IllegalDataAddress
    })
}

fn apply(twin: &mut PlantTwin, key: ControlKey, value: ControlValue) -> Result<(), ExceptionCode> {
    twin.apply_control(key, value).map_err(|e| {
        error!("Exception::IllegalDataValue - {}", e);
        ExceptionCode::IllegalDataValue
    })
}

/// Engineering value behind one holding register. Setpoints read back the
/// live controls; everything else reads the published sensor view.
fn signal_value(twin: &PlantTwin, signal: HoldingSignal) -> f64 {
    let view: &StateView = twin.published();
    match signal {
        HoldingSignal::Setpoint(key) => twin.controls().setpoint(key).unwrap_or(0.0),
        HoldingSignal::QWellfield => view.q_wellfield,
        HoldingSignal::QFeed => view.q_feed,
        HoldingSignal::QPerm => view.q_perm,
        HoldingSignal::QBrine => view.q_brine,
        HoldingSignal::QOut => view.q_out,
        HoldingSignal::LevelFeedTank => view.level_feed_tank,
        HoldingSignal::LevelClearwell => view.level_clearwell,
        HoldingSignal::PressureWell => view.pressure_well,
        HoldingSignal::PressureFeed => view.pressure_feed,
        HoldingSignal::PressureDist => view.pressure_dist,
        HoldingSignal::DpRo => view.dp_ro,
        HoldingSignal::TdsFeed => view.tds_feed,
        HoldingSignal::TdsPerm => view.tds_perm,
        HoldingSignal::Ph => view.ph,
        HoldingSignal::Cl => view.cl,
        HoldingSignal::MembraneHealth => view.membrane_health,
        HoldingSignal::PumpWellHealth => view.pump_well_health,
        HoldingSignal::PumpFeedHealth => view.pump_feed_health,
        HoldingSignal::PumpDistHealth => view.pump_dist_health,
        HoldingSignal::PipeWellHealth => view.pipe_well_health,
        HoldingSignal::PipeFeedHealth => view.pipe_feed_health,
        HoldingSignal::PipeDistHealth => view.pipe_dist_health,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::create_shared_plant;

    fn server() -> WaterPlantModbusServer {
        WaterPlantModbusServer::new(create_shared_plant(3))
    }

    #[test]
    fn default_coils_expose_open_valves_and_stopped_pumps() {
        let server = server();
        let coils = server.read_coils(0, 10).unwrap();
        assert_eq!(
            coils,
            vec![false, false, false, true, true, true, true, true, false, false]
        );
    }

    #[test]
    fn coil_write_is_read_back() {
        let server = server();
        server.write_coils(0, &[true]).unwrap();
        assert_eq!(server.read_coils(0, 1).unwrap(), vec![true]);
    }

    #[test]
    fn out_of_range_coil_is_illegal_address() {
        let server = server();
        assert_eq!(
            server.read_coils(8, 3).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
        assert_eq!(
            server.write_coils(10, &[true]).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn invalid_multi_coil_frame_applies_nothing() {
        let server = server();
        // Second coil of the pair is unmapped, so the first must not change.
        assert!(server.write_coils(9, &[true, true]).is_err());
        assert_eq!(server.read_coils(9, 1).unwrap(), vec![false]);
    }

    #[test]
    fn setpoint_write_round_trips_through_scaling() {
        let server = server();
        // NaOH_dose is scaled ÷10: raw 85 is 8.5 mg/L.
        server.write_holding(0, &[85]).unwrap();
        assert_eq!(server.read_holding(0, 1).unwrap(), vec![85]);
        let twin = server.plant.read().unwrap();
        assert_eq!(twin.controls().naoh_dose, 8.5);
    }

    #[test]
    fn write_to_process_variable_register_is_illegal_address() {
        let server = server();
        assert_eq!(
            server.write_holding(11, &[1]).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
        assert_eq!(
            server.write_holding(30, &[1000]).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn overflowing_setpoint_is_illegal_value() {
        let server = server();
        assert_eq!(
            server.write_holding(1, &[51]).unwrap_err(),
            ExceptionCode::IllegalDataValue
        );
        // Nothing was applied.
        assert_eq!(server.read_holding(1, 1).unwrap(), vec![0]);
    }

    #[test]
    fn holding_read_across_a_gap_is_illegal_address() {
        let server = server();
        assert_eq!(
            server.read_holding(0, 4).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
        assert_eq!(
            server.read_holding(24, 2).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn health_registers_read_full_scale_at_start() {
        let server = server();
        let health = server.read_holding(30, 7).unwrap();
        assert_eq!(health, vec![1000; 7]);
    }
}
