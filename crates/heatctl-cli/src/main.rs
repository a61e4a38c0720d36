//! `heatctl` – runs the simulated single-room heating loop.
//!
//! 1. Loads `heatctl.toml` (or the file given with `--config`).
//! 2. Starts the valve driver, the controller with its acknowledgment
//!    listener, and one simulated sensor per configured sensor.
//! 3. Runs until the configured work time elapses or Ctrl-C is pressed,
//!    then stops every task and logs the decision ledger.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use heatctl_hal::{SensorSim, SimValve, ValveDriver};
use heatctl_middleware::{EventBus, shutdown};
use heatctl_runtime::{Controller, ControllerReport, init_tracing};
use heatctl_types::HeatError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;

/// Upper bound on how long stopped tasks get to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "heatctl", version, about = "Simulated single-room heating control loop")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "heatctl.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing("heatctl");

    let cfg = match config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "unable to load configuration");
            return ExitCode::FAILURE;
        }
    };

    // The runtime is built after tracing so the simple span exporter never
    // needs a running executor.
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "unable to start the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(report) => {
            info!(
                level = ?report.current_level.map(|l| l.get()),
                cycles = report.confirmed_cycles,
                failures = report.failed_applications,
                history = ?report.ledger.entries(),
                "decision ledger"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "heatctl stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> Result<ControllerReport, HeatError> {
    let controller_cfg = cfg.controller_config()?;
    let bus = EventBus::new(cfg.bus_capacity);
    let (trigger, signal) = shutdown::channel();
    let trigger = Arc::new(trigger);

    let ctrlc_trigger = Arc::clone(&trigger);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Ctrl-C received, stopping");
        ctrlc_trigger.trigger();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; only the work-time limit will stop heatctl");
    }

    info!(
        setpoint = controller_cfg.setpoint,
        sensors = controller_cfg.sensors_count,
        work_time_secs = cfg.work_time_secs,
        "starting heatctl"
    );

    // Actuator and controller subscribe before the sensors publish their
    // first readings.
    let valve = if cfg.valve.faulty {
        SimValve::faulty(controller_cfg.valve_id.clone())
    } else {
        SimValve::new(controller_cfg.valve_id.clone())
    };
    let driver = ValveDriver::new(Box::new(valve), bus.clone())
        .with_response_delay(cfg.response_delay())
        .spawn(signal.clone());

    let handles = Controller::new(controller_cfg.clone(), bus.clone())?.spawn(signal.clone());

    let mut workers: Vec<JoinHandle<()>> = vec![driver, handles.ack_listener];
    for id in 0..controller_cfg.sensors_count {
        let initial = cfg.sensor.initial_temperature_for(id, controller_cfg.sensors_count);
        let sensor = SensorSim::new(id, initial, cfg.sensor.settings(), bus.clone());
        workers.push(sensor.spawn(signal.clone()));
    }

    let mut stop = signal.clone();
    tokio::select! {
        _ = tokio::time::sleep(cfg.work_time()) => {}
        _ = stop.wait() => {}
    }
    if stop.is_triggered() {
        info!("stop requested before the work time elapsed");
    } else {
        info!("work time elapsed");
        trigger.trigger();
    }

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    let mut controller = handles.controller;
    let report = match tokio::time::timeout_at(deadline, &mut controller).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => return Err(HeatError::Channel(format!("controller task failed: {e}"))),
        Err(_) => {
            controller.abort();
            return Err(HeatError::Channel("controller did not stop in time".to_string()));
        }
    };

    for worker in &mut workers {
        match tokio::time::timeout_at(deadline, &mut *worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "task ended abnormally"),
            Err(_) => {
                warn!("task did not stop in time, aborting");
                worker.abort();
            }
        }
    }

    Ok(report)
}
