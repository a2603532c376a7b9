use clap::Subcommand;

use crate::client::SkymmichClient;
use crate::output::{self, OutputConfig};

/// Plate-solving job commands
#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// List jobs, newest first
    List {
        /// Only jobs in this state (pending, processing, success, failed)
        #[clap(long)]
        status: Option<String>,
    },
    /// Show one job
    Show {
        /// The job ID
        id: String,
    },
    /// Requeue a failed job
    Retry {
        /// The job ID
        id: String,
    },
}

/// Executes a job command
pub async fn execute(
    client: &SkymmichClient,
    cmd: JobCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        JobCommands::List { status } => {
            let jobs = client.list_jobs(status.as_deref()).await?;
            output::print_jobs(&jobs, config);
        }
        JobCommands::Show { id } => {
            let job = client.get_job(&id).await?;
            output::print_job(&job, config);
        }
        JobCommands::Retry { id } => {
            let job = client.retry_job(&id).await?;
            output::print_job(&job, config);
        }
    }
    Ok(())
}
