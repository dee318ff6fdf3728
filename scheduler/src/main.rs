use clap::Parser;
use slurmq_scheduler::client::SlurmRestClient;
use slurmq_scheduler::config::SchedulerConfig;
use slurmq_scheduler::scheduler::JobScheduler;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Submit and monitor batches of cluster jobs")]
struct Cli {
    /// Path to the scheduler configuration
    config: PathBuf,
    /// Resubmit jobs that were cancelled out from under the batch
    #[arg(long)]
    resubmit_killed: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let config = match SchedulerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = ?cli.config, error = %e, "could not load configuration");
            return ExitCode::FAILURE;
        }
    };
    if config.preflight_checks() {
        error!("configuration failed preflight checks, not submitting anything");
        return ExitCode::FAILURE;
    }

    let user_token = config
        .user_token
        .clone()
        .or_else(|| std::env::var("SLURM_JWT").ok());
    let client = match SlurmRestClient::new(&config.url, config.user_name.clone(), user_token) {
        Ok(client) => client,
        Err(e) => {
            error!(url = %config.url, error = %e, "could not create scheduler client");
            return ExitCode::FAILURE;
        }
    };

    let mut scheduler = JobScheduler::new(
        client,
        config.partition.clone(),
        config.cluster_output_dir.clone(),
        chrono::Duration::seconds(config.wait_timeout as i64),
        config.terminate_after_wait,
    );

    let success = match scheduler.run(config.build_jobs()) {
        Ok(success) => success,
        Err(e) => {
            error!(error = %e, "running the batch failed");
            return ExitCode::FAILURE;
        }
    };

    if success {
        info!("all jobs completed successfully");
        return ExitCode::SUCCESS;
    }
    if cli.resubmit_killed {
        match scheduler.resubmit_killed_jobs(None, false) {
            Ok(true) => {
                info!("resubmitted jobs completed successfully");
                return ExitCode::SUCCESS;
            }
            Ok(false) => error!("resubmitted jobs did not all complete"),
            Err(e) => error!(error = %e, "resubmission failed"),
        }
    } else {
        error!("some jobs did not complete successfully");
    }
    ExitCode::FAILURE
}
