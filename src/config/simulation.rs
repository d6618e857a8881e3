// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulation loop configuration.

/// Settings for the physics tick driver.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Physics tick period in milliseconds. The integration step `dt` is
    /// derived from this, so changing it changes pacing but not the model.
    pub tick_ms: u64,

    /// Number of ticks run before the network servers start accepting
    /// connections, so first readings are quasi-steady.
    pub warmup_ticks: u32,

    /// Seed for the sensor-jitter generator. Fixed seed means reproducible
    /// published read-outs for a given command sequence.
    pub noise_seed: u64,
}

impl SimulationConfig {
    /// Integration step in seconds.
    pub fn dt(&self) -> f64 {
        self.tick_ms as f64 / 1000.0
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            warmup_ticks: 50,
            noise_seed: 17,
        }
    }
}
