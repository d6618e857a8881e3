// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket instance assembly for the publish API.

use rocket::{catchers, routes, Build, Rocket};

use crate::api::routes;
use crate::simulation::{SharedPlantState, TelemetryStream};

/// Build the publish-API Rocket from a prepared figment and the shared
/// plant handles. The caller (normally the daemon) decides address, port
/// and shutdown grace through the figment.
pub fn build_rocket(
    figment: rocket::figment::Figment,
    plant: SharedPlantState,
    telemetry: TelemetryStream,
) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(plant)
        .manage(telemetry)
        .mount(
            "/",
            routes![routes::events, routes::sync, routes::reset_damage],
        )
        .register(
            "/",
            catchers![
                routes::catch_bad_request,
                routes::catch_not_found,
                routes::catch_unprocessable
            ],
        )
}

/// Rocket instance for tests: random port, quiet logging.
pub fn build_rocket_test_instance(
    plant: SharedPlantState,
    telemetry: TelemetryStream,
) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", "127.0.0.1"))
        .merge(("port", 0))
        .merge(("log_level", rocket::config::LogLevel::Off));
    build_rocket(figment, plant, telemetry)
}
