// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP endpoints publishing the plant state.
//!
//! Three routes make up the contract with the dashboard and the in-browser
//! fallback model: an SSE telemetry stream, a snapshot-on-write `/sync`
//! endpoint for clients that cannot speak Modbus, and the damage reset.

use rocket::http::Status;
use rocket::response::status;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{catch, get, post, State};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::registers::ControlKey;
use crate::simulation::{
    ControlValue, Controls, SharedPlantState, StateView, TelemetryConsumer, TelemetryStream,
};

/// Partial control update: only the provided keys are applied.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub controls: serde_json::Map<String, JsonValue>,
}

/// Post-apply snapshot returned by `/sync`.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub state: StateView,
    pub controls: Controls,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn bad_request(message: String) -> status::BadRequest<Json<ErrorBody>> {
    status::BadRequest(Json(ErrorBody { error: message }))
}

/// Server-Sent Events telemetry stream.
///
/// Emits the current snapshot immediately on connect, then one event per
/// published tick snapshot. A slow consumer has intermediate snapshots
/// dropped for it instead of stalling the tick driver. A final `bye` event
/// is sent when the stream closes at shutdown.
#[get("/events")]
pub fn events(telemetry: &State<TelemetryStream>) -> EventStream![Event] {
    let stream = telemetry.inner().clone();

    EventStream! {
        if let Some(snapshot) = stream.latest().await {
            yield Event::json(&snapshot);
        }

        let mut consumer = TelemetryConsumer::new(&stream);
        loop {
            match consumer.next().await {
                Some(snapshot) => yield Event::json(&snapshot),
                None => {
                    yield Event::data("bye").event("bye");
                    break;
                }
            }
        }
    }
}

/// Apply a partial control update and return the post-apply snapshot.
///
/// Unknown keys and type mismatches are rejected with 400 before anything
/// is applied; numeric setpoints are clamped into their declared range.
#[post("/sync", format = "json", data = "<body>")]
pub fn sync(
    body: Json<SyncRequest>,
    plant: &State<SharedPlantState>,
) -> Result<Json<SyncResponse>, status::BadRequest<Json<ErrorBody>>> {
    let mut writes = Vec::with_capacity(body.controls.len());
    for (name, value) in &body.controls {
        let key: ControlKey = name.parse().map_err(|e| bad_request(format!("{e}")))?;
        writes.push((key, control_value(key, value).map_err(bad_request)?));
    }

    let mut twin = plant.write().unwrap();
    for (key, value) in writes {
        twin.apply_control(key, value)
            .map_err(|e| bad_request(format!("{e}")))?;
    }
    let snapshot = twin.snapshot();
    Ok(Json(SyncResponse {
        state: snapshot.state,
        controls: snapshot.controls,
    }))
}

/// Restore every equipment health scalar to 100 %.
#[post("/reset_damage")]
pub fn reset_damage(plant: &State<SharedPlantState>) -> Status {
    plant.write().unwrap().reset_damage();
    Status::NoContent
}

/// Convert a JSON value into a typed control write. Boolean controls accept
/// `true`/`false` as well as 0/1, matching the coil semantics.
fn control_value(key: ControlKey, value: &JsonValue) -> Result<ControlValue, String> {
    if key.is_boolean() {
        match value {
            JsonValue::Bool(on) => Ok(ControlValue::Switch(*on)),
            JsonValue::Number(n) => {
                let raw = n.as_f64().unwrap_or(f64::NAN);
                if raw == 0.0 {
                    Ok(ControlValue::Switch(false))
                } else if raw == 1.0 {
                    Ok(ControlValue::Switch(true))
                } else {
                    Err(format!("control '{}' expects a boolean or 0/1", key))
                }
            }
            _ => Err(format!("control '{}' expects a boolean or 0/1", key)),
        }
    } else {
        match value.as_f64() {
            Some(raw) => Ok(ControlValue::Number(raw)),
            None => Err(format!("control '{}' expects a number", key)),
        }
    }
}

#[catch(400)]
pub fn catch_bad_request() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "bad request".to_string(),
    })
}

#[catch(404)]
pub fn catch_not_found() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "no such route".to_string(),
    })
}

#[catch(422)]
pub fn catch_unprocessable() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "malformed request body".to_string(),
    })
}
