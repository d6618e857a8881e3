// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rocket::config::LogLevel;
use rocket::data::{Limits, ToByteUnit};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::api::build_rocket;
use crate::config::Config;
use crate::modbus::WaterPlantModbusServer;
use crate::simulation::{create_shared_plant, SharedPlantState, TelemetryStream};

/// Daemon task manager coordinating the tick driver and the network servers.
///
/// The shared plant state is created here, warmed up before any listener
/// binds, and then handed to the Modbus and HTTP tasks. The `running` flag
/// is shared with every task; each one checks it periodically and
/// terminates gracefully when it flips.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    config: Arc<Config>,
    plant: SharedPlantState,
    telemetry: TelemetryStream,
    /// Malformed-frame / connection-level Modbus errors since start.
    protocol_errors: Arc<AtomicU64>,
    /// Handle used to ask Rocket for a graceful stop.
    rocket_shutdown: Option<rocket::Shutdown>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let plant = create_shared_plant(config.simulation.noise_seed);
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            config: Arc::new(config),
            plant,
            telemetry: TelemetryStream::new(16),
            protocol_errors: Arc::new(AtomicU64::new(0)),
            rocket_shutdown: None,
        }
    }

    /// Shared plant handle for embedding or tests.
    pub fn plant(&self) -> SharedPlantState {
        Arc::clone(&self.plant)
    }

    /// Warm the plant up, then start every enabled service.
    pub async fn launch(&mut self) -> Result<()> {
        self.run_warmup().await;

        self.start_tick_driver();

        if self.config.modbus.enabled {
            self.start_modbus_server().await?;
        }
        if self.config.http.enabled {
            self.start_http_server().await?;
        }

        self.start_heartbeat();
        Ok(())
    }

    /// Run the configured number of warmup ticks so the first readings the
    /// network ever serves are quasi-steady, and seed the telemetry stream
    /// with the post-warmup snapshot.
    async fn run_warmup(&self) {
        let dt = self.config.simulation.dt();
        let ticks = self.config.simulation.warmup_ticks;

        let snapshot = {
            let mut twin = self.plant.write().unwrap();
            for _ in 0..ticks {
                twin.tick(dt);
            }
            twin.snapshot()
        };
        self.telemetry.publish(snapshot).await;

        info!(
            "warmup complete: {} ticks, {:.1} s simulated",
            ticks,
            f64::from(ticks) * dt
        );
    }

    /// Start the periodic physics tick.
    ///
    /// Integration always uses the configured `dt`; the interval paces the
    /// loop against the wall clock and skips missed ticks, so a paused
    /// debugger does not warp the simulation.
    fn start_tick_driver(&mut self) {
        let period = Duration::from_millis(self.config.simulation.tick_ms);
        let dt = self.config.simulation.dt();
        let plant = Arc::clone(&self.plant);
        let telemetry = self.telemetry.clone();
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            info!("tick driver started ({} ms period)", period.as_millis());
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                let snapshot = {
                    let mut twin = plant.write().unwrap();
                    twin.tick(dt);
                    twin.snapshot()
                };
                telemetry.publish(snapshot).await;
            }

            info!("tick driver stopped");
            Ok(())
        });

        self.tasks.push(task);
    }

    /// Launch the Modbus TCP server.
    ///
    /// Binding happens here, before the task is spawned, so a port that is
    /// already taken fails startup instead of dying silently in the
    /// background. When the primary port needs privileges we fall back to
    /// the unprivileged one.
    async fn start_modbus_server(&mut self) -> Result<()> {
        let modbus = &self.config.modbus;
        let primary: SocketAddr = format!("{}:{}", modbus.address, modbus.port)
            .parse()
            .with_context(|| format!("invalid Modbus bind address {}", modbus.address))?;

        let listener = match TcpListener::bind(primary).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(
                    "could not bind Modbus port {} ({}), trying fallback port {}",
                    modbus.port, e, modbus.fallback_port
                );
                let fallback: SocketAddr =
                    format!("{}:{}", modbus.address, modbus.fallback_port).parse()?;
                TcpListener::bind(fallback).await.with_context(|| {
                    format!(
                        "could not bind Modbus server on {} or {}",
                        modbus.port, modbus.fallback_port
                    )
                })?
            }
        };
        info!("Modbus server listening on {}", listener.local_addr()?);

        let running = self.running.clone();
        let plant = Arc::clone(&self.plant);
        let protocol_errors = Arc::clone(&self.protocol_errors);

        let task = tokio::spawn(async move {
            let server = Server::new(listener);

            // A fresh service per connection; they all answer against the
            // same shared plant.
            let on_connected = move |stream, socket_addr| {
                let plant = Arc::clone(&plant);
                async move {
                    debug!("Modbus client connected: {}", socket_addr);
                    accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                        Ok(Some(WaterPlantModbusServer::new(Arc::clone(&plant))))
                    })
                }
            };

            let on_process_error = move |err| {
                error!("Modbus connection error: {err}");
                protocol_errors.fetch_add(1, Ordering::Relaxed);
            };

            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(&on_connected, on_process_error).await {
                    error!("Modbus server error: {}", e);
                }
            });

            // Monitor the running flag and shut down when requested.
            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_secs(1)).await;
            }

            info!("shutting down Modbus server");
            server_handle.abort();
            match tokio::time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }

            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Launch the Rocket server for the publish API.
    async fn start_http_server(&mut self) -> Result<()> {
        let http = &self.config.http;
        info!("starting HTTP server on {}:{}", http.address, http.port);

        // Rocket only binds at launch time, inside the spawned task; probe
        // the port here so an occupied address is fatal at startup.
        let probe_addr: SocketAddr = format!("{}:{}", http.address, http.port)
            .parse()
            .with_context(|| format!("invalid HTTP bind address {}", http.address))?;
        drop(
            TcpListener::bind(probe_addr)
                .await
                .with_context(|| format!("could not bind HTTP server on {}", probe_addr))?,
        );

        let figment = rocket::Config::figment()
            .merge(("ident", format!("WtpTwin/{}", env!("CARGO_PKG_VERSION"))))
            .merge(("limits", Limits::new().limit("json", 1.mebibytes())))
            .merge(("address", http.address.clone()))
            .merge(("port", http.port))
            .merge(("log_level", LogLevel::Normal))
            .merge(("shutdown.grace", 2))
            .merge(("shutdown.mercy", 1));

        let rocket = build_rocket(figment, Arc::clone(&self.plant), self.telemetry.clone());
        let ignited = rocket.ignite().await?;
        self.rocket_shutdown = Some(ignited.shutdown());

        let task = tokio::spawn(async move {
            let _rocket = ignited.launch().await?;
            info!("HTTP server stopped");
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Periodic liveness log with the protocol error counter.
    fn start_heartbeat(&mut self) {
        let running = self.running.clone();
        let protocol_errors = Arc::clone(&self.protocol_errors);
        let telemetry = self.telemetry.clone();

        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!(
                    "daemon heartbeat: running, {} SSE subscribers, {} Modbus protocol errors",
                    telemetry.subscriber_count(),
                    protocol_errors.load(Ordering::Relaxed)
                );
                time::sleep(Duration::from_secs(60)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
    }

    /// Signal every task to stop. Does not wait; call [`Daemon::join`].
    pub fn shutdown(&self) {
        info!("shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        if let Some(shutdown) = &self.rocket_shutdown {
            shutdown.clone().notify();
        }
    }

    /// Wait for every task to finish. Panicking or hung tasks are logged
    /// but do not block the exit for more than the per-task timeout.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("task finished with error: {}", e),
                Ok(Err(e)) => error!("task panicked: {}", e),
                Err(_) => warn!("task did not complete within timeout, may be hung"),
            }
        }
        Ok(())
    }
}
