use super::{
    core_error, heading, json_pretty, print_counters, ProgressSink, EXIT_CANARY_FAILED,
    EXIT_FAILURE, EXIT_SUCCESS,
};
use indexquake_core::{install_signal_handler, NullSink, RunConfig, RunCoordinator, StatusSink};
use tracing::debug;

pub fn run(config: RunConfig, strict: bool, json: bool) -> Result<u8, String> {
    debug!(
        index = %config.index.name,
        documents = config.run.documents,
        chaos = config.chaos.enabled,
        "starting run"
    );
    let connector = config
        .connector()
        .map_err(|e| format!("store error: {e}"))?;
    let coordinator = RunCoordinator::connect(config, connector).map_err(core_error)?;
    install_signal_handler(coordinator.interrupt().clone());

    let mut sink: Box<dyn StatusSink> = if json {
        Box::new(NullSink)
    } else {
        Box::new(ProgressSink::new(coordinator.config().run.documents))
    };
    let summary = coordinator.run(&mut *sink).map_err(core_error)?;

    if json {
        println!("{}", json_pretty(&summary)?);
    } else {
        println!("{}", heading("run summary"));
        println!("store:         {}", summary.store);
        println!(
            "index:         {} ({} fields)",
            summary.index, summary.schema_fields
        );
        print_counters(&summary.counters);
        if summary.writer.interrupted {
            println!(
                "interrupted:   {} of {} writes attempted",
                summary.writer.attempted(),
                summary.writer.requested
            );
        }
        println!("canary state:  {}", summary.canary_state);
        println!("elapsed:       {} ms", summary.elapsed_ms);
        println!("shutdown:      {} ms", summary.shutdown_latency_ms);
        if summary.panics > 0 {
            println!("panics:        {}", summary.panics);
        }
    }

    if summary.panics > 0 {
        return Ok(EXIT_FAILURE);
    }
    if strict && summary.canary_failed() {
        eprintln!(
            "error: canary verification failed {} times",
            summary.counters.verification_failure
        );
        return Ok(EXIT_CANARY_FAILED);
    }
    Ok(EXIT_SUCCESS)
}
