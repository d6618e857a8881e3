// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Application configuration.
//!
//! No configuration files: defaults are overridden first by `WTP_*`
//! environment variables, then by command-line flags, in that order of
//! precedence.

mod http;
mod modbus;
mod simulation;

pub use http::HttpConfig;
pub use modbus::ModbusConfig;
pub use simulation::SimulationConfig;

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// Complete application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub modbus: ModbusConfig,
    pub http: HttpConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    /// Defaults overridden by any `WTP_*` environment variables present.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        env_override(&mut config.modbus.enabled, "WTP_MODBUS_ENABLED")?;
        env_override(&mut config.modbus.address, "WTP_MODBUS_ADDRESS")?;
        env_override(&mut config.modbus.port, "WTP_MODBUS_PORT")?;
        env_override(&mut config.modbus.fallback_port, "WTP_MODBUS_FALLBACK_PORT")?;
        env_override(&mut config.http.enabled, "WTP_HTTP_ENABLED")?;
        env_override(&mut config.http.address, "WTP_HTTP_ADDRESS")?;
        env_override(&mut config.http.port, "WTP_HTTP_PORT")?;
        env_override(&mut config.simulation.tick_ms, "WTP_TICK_MS")?;
        env_override(&mut config.simulation.warmup_ticks, "WTP_WARMUP_TICKS")?;
        env_override(&mut config.simulation.noise_seed, "WTP_NOISE_SEED")?;
        Ok(config)
    }

    /// Apply command-line overrides on top of whatever is configured.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        modbus_enabled: Option<bool>,
        modbus_address: Option<String>,
        modbus_port: Option<u16>,
        http_enabled: Option<bool>,
        http_address: Option<String>,
        http_port: Option<u16>,
        tick_ms: Option<u64>,
        warmup_ticks: Option<u32>,
        noise_seed: Option<u64>,
    ) {
        if let Some(enabled) = modbus_enabled {
            self.modbus.enabled = enabled;
        }
        if let Some(address) = modbus_address {
            self.modbus.address = address;
        }
        if let Some(port) = modbus_port {
            self.modbus.port = port;
        }
        if let Some(enabled) = http_enabled {
            self.http.enabled = enabled;
        }
        if let Some(address) = http_address {
            self.http.address = address;
        }
        if let Some(port) = http_port {
            self.http.port = port;
        }
        if let Some(tick_ms) = tick_ms {
            self.simulation.tick_ms = tick_ms.max(1);
        }
        if let Some(warmup_ticks) = warmup_ticks {
            self.simulation.warmup_ticks = warmup_ticks;
        }
        if let Some(noise_seed) = noise_seed {
            self.simulation.noise_seed = noise_seed;
        }
    }
}

fn env_override<T>(target: &mut T, name: &str) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Ok(raw) = env::var(name) {
        *target = raw
            .parse()
            .map_err(|e| anyhow!("invalid value for {}: {}", name, e))?;
    }
    Ok(())
}
