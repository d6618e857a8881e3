// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Background service management: the tick driver, the Modbus TCP server
//! and the HTTP publish API run as tasks coordinated by [`launch_daemon::Daemon`].

pub mod launch_daemon;

pub use launch_daemon::Daemon;
