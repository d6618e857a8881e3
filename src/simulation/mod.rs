// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Plant simulation: shared state, fixed-step physics, sensor emission and
//! telemetry fan-out.

pub mod physics;
pub mod sensors;
pub mod state;
pub mod stream;

pub use state::{
    create_shared_plant, ControlError, ControlValue, Controls, PlantSnapshot, PlantState,
    PlantTwin, SharedPlantState, StateView,
};
pub use stream::{TelemetryConsumer, TelemetryStream};
