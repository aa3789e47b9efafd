use anyhow::{Context, Result};
use arkd::core::{Job, Status};
use arkd::logging::{self, LogConfig};
use arkd::rpc::RpcClient;
use arkd::{config, context, core::Orchestrator, db};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "arkd")]
#[command(about = "Backup scheduler and plugin manager for ARK dedicated servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Daemon(ServerArgs),
    /// Show scheduler status
    Status,
    /// List configured jobs
    Jobs,
    /// Print the tail of the daemon log
    Logs {
        #[arg(long, default_value_t = logging::DEFAULT_TAIL_LINES)]
        lines: usize,
    },
    /// Queue a job for immediate execution
    Run { id: String },
}

#[derive(Args, Serialize)]
struct ServerArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    data_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    rpc_bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    http_bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    tick_interval_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    monthly_archive_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    server_roots_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Daemon(args) => config::AppConfig::new(Some(args))?,
        _ => config::AppConfig::new(None::<&ServerArgs>)?,
    };

    match cli.command {
        Commands::Daemon(_) => {
            let _guard = logging::init(LogConfig {
                json: config.json_logs,
                verbose: config.verbose,
                log_dir: Some(config.log_dir()),
            });
            let db_conn = db::init(&config.database_path()).await?;
            let ctx = context::AppContext::new(config, db_conn);
            Orchestrator::new(ctx)
                .start()
                .await
                .context("Failed to start daemon")?
        }
        Commands::Status => {
            let client = RpcClient::new(config.rpc_bind);
            let status: Status = client
                .call_no_params("get_status")
                .await
                .context("Failed to check status of daemon")?;
            print_status(&status);
        }
        Commands::Jobs => {
            let client = RpcClient::new(config.rpc_bind);
            let jobs: Vec<Job> = client
                .call_no_params("list_jobs")
                .await
                .context("Failed to list jobs")?;
            print_jobs(&jobs);
        }
        Commands::Logs { lines } => {
            let client = RpcClient::new(config.rpc_bind);
            let text: String = client
                .call("read_logs", Some(json!({ "lines": lines })))
                .await
                .context("Failed to read logs")?;
            println!("{}", text);
        }
        Commands::Run { id } => {
            let client = RpcClient::new(config.rpc_bind);
            let reply: serde_json::Value = client
                .call("run_job_now", Some(json!({ "id": id })))
                .await
                .context("Failed to queue job")?;
            if reply["queued"].as_bool().unwrap_or(false) {
                println!("Queued {}", id);
            } else {
                println!("{} is already queued", id);
            }
        }
    }

    Ok(())
}

fn print_status(status: &Status) {
    println!("running:     {}", status.running);
    println!("queue size:  {}", status.queue_size);
    match &status.current_job {
        Some(job) => println!("current job: {} ({})", job.name, job.id),
        None => println!("current job: -"),
    }
    match status.last_tick {
        Some(at) => println!("last tick:   {}", at.to_rfc3339()),
        None => println!("last tick:   -"),
    }
}

fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs configured");
        return;
    }

    for job in jobs {
        let state = match (&job.last_error, job.enabled) {
            (Some(_), _) => "failed",
            (None, false) => "disabled",
            (None, true) => "ok",
        };
        let next = job
            .next_run_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<24} every {} {:<7} next {}  [{}]",
            job.id,
            job.name,
            job.interval_value,
            job.interval_unit.as_str(),
            next,
            state
        );
        if let Some(error) = &job.last_error {
            println!("    last error: {}", error);
        }
    }
}
