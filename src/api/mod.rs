// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP publish API: SSE telemetry, snapshot-on-write sync, damage reset.

pub mod routes;
pub mod server;

pub use server::{build_rocket, build_rocket_test_instance};
