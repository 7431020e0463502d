mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use harvester::config::Config;
use harvester::{harvest, observability};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let mut config = Config::load(args.config)?;
            if let Some(workers) = args.workers {
                config.pool.workers = workers.get();
            }
            observability::init_tracing(&config.telemetry.log_level);

            // one runtime thread per worker
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.pool.workers)
                .enable_all()
                .build()?;

            let outcome = runtime.block_on(harvest::run(config))?;
            if outcome.exit_code() != 0 {
                // workers still mid-task are abandoned with the process
                std::process::exit(outcome.exit_code());
            }
        }
    }

    Ok(())
}
