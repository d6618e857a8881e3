// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server configuration.

/// Settings for the Modbus TCP server component.
#[derive(Debug, Clone)]
pub struct ModbusConfig {
    /// Flag to enable or disable the Modbus server.
    pub enabled: bool,

    /// The network address the Modbus server will bind to.
    ///
    /// Default is "0.0.0.0": the protocol surface is meant to be reachable
    /// (and attackable) from the training network.
    pub address: String,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Default is 502, the standard Modbus TCP port.
    pub port: u16,

    /// Port tried when binding `port` fails, typically because 502 needs
    /// elevated privileges. Default is 5020.
    pub fallback_port: u16,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 502,
            fallback_port: 5020,
        }
    }
}
