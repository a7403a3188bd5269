/*!
 * powermgrd - Power Service Entry Point
 *
 * Hosts the running lock registry on top of the kernel sysfs power interface:
 * - Kernel wake lock forwarding
 * - Optional auto-suspend loop
 * - Periodic diagnostic dump
 */

use powermgr::{init_tracing, LogSink, PowerConfig, RunningLockRegistry, StandaloneStateMachine};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Interval between diagnostic dumps
const DUMP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> miette::Result<()> {
    let config = PowerConfig::from_env()?;
    init_tracing(config.trace_json);

    info!("powermgrd starting...");
    info!(
        sysfs_root = %config.sysfs_root.display(),
        auto_suspend = config.auto_suspend,
        interval_ms = config.auto_suspend_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let sink = if config.trace_json { LogSink::json() } else { LogSink::new() };
    let registry = RunningLockRegistry::builder()
        .with_config(config)
        .with_state_machine(Arc::new(StandaloneStateMachine::default()))
        .with_event_sink(Arc::new(sink))
        .build()?;

    info!("Power service ready");
    info!("Press Ctrl+C to exit");

    let mut ticker = tokio::time::interval(DUMP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("\n{}", registry.dump());
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Signal handler failed, shutting down");
                }
                break;
            }
        }
    }

    info!("powermgrd shutting down");
    registry.reset_running_locks();

    // Joining the auto-suspend thread may wait for an in-flight suspend
    let shutdown_registry = registry.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || shutdown_registry.shutdown()).await {
        warn!(error = %e, "Shutdown task failed");
    }

    info!("powermgrd stopped");
    Ok(())
}
