// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Publish-API (HTTP) server configuration.

/// Settings for the HTTP server exposing SSE telemetry and the REST routes.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Flag to enable or disable the HTTP server.
    pub enabled: bool,

    /// The network address the server will bind to. Default "0.0.0.0".
    pub address: String,

    /// The TCP port the server will listen on. Default 8000.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}
