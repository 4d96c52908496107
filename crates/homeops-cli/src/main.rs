//! homeops CLI tool.

use clap::{Parser, Subcommand};

mod commands;

use commands::ApiClient;

#[derive(Parser)]
#[command(name = "homeops")]
#[command(about = "homeops task queue and service CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "HOMEOPS_API_URL", default_value = "http://localhost:5051")]
    api_url: String,

    /// API key sent as X-API-Key
    #[arg(long, env = "HOMEOPS_API_KEY")]
    api_key: Option<String>,

    /// Worker instance id for claim, heartbeat and completion
    #[arg(long, env = "HOMEOPS_INSTANCE_ID")]
    instance_id: Option<String>,

    /// Worker display name
    #[arg(long, env = "HOMEOPS_INSTANCE_NAME")]
    instance_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with the task queue
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Report this worker as alive
    Heartbeat,
    /// Show queue counters
    Stats,
    /// List worker instances
    Instances {
        /// Only instances seen within this many minutes
        #[arg(long)]
        window_minutes: Option<u64>,
    },
    /// Inspect monitored services
    Services {
        #[command(subcommand)]
        command: ServiceCommands,
    },
    /// Pull and recreate a service's container
    Update {
        /// Service name
        service: String,
        /// Update key, if different from the API key
        #[arg(long, env = "HOMEOPS_UPDATE_API_KEY")]
        update_key: Option<String>,
    },
    /// Show an update job
    UpdateStatus {
        /// Job ID
        job: String,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks
    List {
        /// pending, in_progress, completed, failed, cancelled or all
        #[arg(long)]
        status: Option<String>,
    },
    /// Show task details
    Show {
        /// Task ID
        id: i64,
    },
    /// Submit a new task
    Submit {
        /// What needs doing
        description: String,
        /// high, medium or low
        #[arg(long)]
        priority: Option<String>,
        /// Submitter recorded on the task
        #[arg(long, default_value = "cli")]
        submitted_by: String,
    },
    /// Show the next pending task without claiming it
    Next,
    /// Claim a specific task
    Claim {
        /// Task ID
        id: i64,
    },
    /// Claim the next pending task
    ClaimNext,
    /// Mark a task completed
    Complete {
        /// Task ID
        id: i64,
        /// Completion notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Mark a task failed
    Fail {
        /// Task ID
        id: i64,
        /// Failure reason
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel a task
    Cancel {
        /// Task ID
        id: i64,
    },
    /// Change a task's priority
    Priority {
        /// Task ID
        id: i64,
        /// high, medium or low
        priority: String,
    },
    /// Show a task's audit trail
    History {
        /// Task ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum ServiceCommands {
    /// List services grouped by category
    List {
        /// Only this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Show fleet counters
    Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.api_url, cli.api_key.clone())?;
    let worker = commands::Worker {
        instance_id: cli.instance_id.clone(),
        instance_name: cli.instance_name.clone(),
    };

    match cli.command {
        Commands::Tasks { command } => match command {
            TaskCommands::List { status } => commands::tasks::list(&api, status).await?,
            TaskCommands::Show { id } => commands::tasks::show(&api, id).await?,
            TaskCommands::Submit {
                description,
                priority,
                submitted_by,
            } => commands::tasks::submit(&api, &description, priority, &submitted_by).await?,
            TaskCommands::Next => commands::tasks::next(&api).await?,
            TaskCommands::Claim { id } => commands::tasks::claim(&api, id, &worker).await?,
            TaskCommands::ClaimNext => commands::tasks::claim_next(&api, &worker).await?,
            TaskCommands::Complete { id, notes } => {
                commands::tasks::complete(&api, id, &worker, notes).await?
            }
            TaskCommands::Fail { id, notes } => {
                commands::tasks::fail(&api, id, &worker, notes).await?
            }
            TaskCommands::Cancel { id } => commands::tasks::cancel(&api, id).await?,
            TaskCommands::Priority { id, priority } => {
                commands::tasks::priority(&api, id, &priority).await?
            }
            TaskCommands::History { id } => commands::tasks::history(&api, id).await?,
        },
        Commands::Heartbeat => commands::tasks::heartbeat(&api, &worker).await?,
        Commands::Stats => commands::tasks::stats(&api).await?,
        Commands::Instances { window_minutes } => {
            commands::tasks::instances(&api, window_minutes).await?
        }
        Commands::Services { command } => match command {
            ServiceCommands::List { category } => {
                commands::services::list(&api, category).await?
            }
            ServiceCommands::Summary => commands::services::summary(&api).await?,
        },
        Commands::Update {
            service,
            update_key,
        } => commands::services::update(&api, &service, update_key).await?,
        Commands::UpdateStatus { job } => commands::services::update_status(&api, &job).await?,
    }

    Ok(())
}
