// src/main.rs

use anyhow::Context;
use fleet_agent::{cli, config, logging, priority, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("fleet-agent error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let settings = config::load_and_validate(&args)?;
    logging::init_logging(settings.log_level, settings.log_dir.as_deref())?;
    priority::lower_own_priority(settings.nice);

    // Single reactor thread; sampling runs on the bounded blocking pool.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(settings.worker_threads)
        .thread_name("fleet-agent-worker")
        .build()
        .context("building reactor runtime")?;

    runtime.block_on(run(settings))
}
