use super::{core_error, heading, json_pretty, print_counters, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use indexquake_core::{install_signal_handler, RunConfig, RunCoordinator};
use tracing::debug;

pub fn run(config: RunConfig, json: bool) -> Result<u8, String> {
    let connector = config
        .connector()
        .map_err(|e| format!("store error: {e}"))?;
    let pool_config = config.swarm_pool_config();
    debug!(
        workers = config.swarm.workers,
        connections = pool_config.max_size,
        "starting swarm"
    );
    let coordinator =
        RunCoordinator::connect_with_pool(config, connector, pool_config).map_err(core_error)?;
    install_signal_handler(coordinator.interrupt().clone());

    let swarm = &coordinator.config().swarm;
    let pb = (!json).then(|| {
        spinner(&format!(
            "{} workers for {}s...",
            swarm.workers, swarm.duration_secs
        ))
    });
    let summary = coordinator.swarm().map_err(core_error)?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if json {
        println!("{}", json_pretty(&summary)?);
    } else {
        println!("{}", heading("swarm summary"));
        println!("store:         {}", summary.store);
        println!(
            "workers:       {} ({} connections)",
            summary.workers, summary.connections
        );
        print_counters(&summary.counters);
        println!("elapsed:       {} ms", summary.report.elapsed_ms);
        for (name, tally) in &summary.report.total.per_command {
            println!("  {name:<24} {:>8} ({} failed)", tally.executed, tally.failed);
        }
    }

    if summary.report.panics > 0 {
        return Ok(EXIT_FAILURE);
    }
    Ok(EXIT_SUCCESS)
}
