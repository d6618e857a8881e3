// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Digital twin of a small reverse-osmosis water treatment plant for
//! industrial cybersecurity training.
//!
//! The twin accepts pump/valve/setpoint commands over Modbus TCP as a live
//! PLC would, runs a deterministic fixed-step physics and damage model, and
//! publishes the resulting process variables through Modbus holding
//! registers, an SSE push stream and a snapshot-on-write REST endpoint.
//! There is deliberately no authentication or transport encryption: the
//! protocol surface is the training target.

pub mod api;
pub mod config;
pub mod daemon;
pub mod modbus;
pub mod registers;
pub mod simulation;
