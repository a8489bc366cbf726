//! ats CLI: operator interface to an automation server work queue.

use std::time::Duration;

use anyhow::Context as _;
use ats_client::config::Config;
use ats_client::model::{Status, WorkqueueId};
use ats_client::telemetry::{AuditLogLayer, TelemetryConfig, init_telemetry};
use ats_client::{AutomationServer, Client};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "ats", about = "Automation server work queue client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved session, process and work queue
    Info,
    /// Add a work item to the queue
    Enqueue {
        /// Human-readable reference for the item
        #[arg(long)]
        reference: String,
        /// JSON object payload
        #[arg(long)]
        data: Option<String>,
        /// Work queue id (defaults to the session's queue)
        #[arg(long)]
        queue: Option<i64>,
    },
    /// Remove items from the queue
    Clear {
        /// Only items with this status (e.g. "failed", "new")
        #[arg(long)]
        status: Option<String>,
        /// Only items older than this many days
        #[arg(long)]
        days_older_than: Option<u32>,
        /// Work queue id (defaults to the session's queue)
        #[arg(long)]
        queue: Option<i64>,
    },
    /// Show a stored credential (password redacted unless --reveal)
    Credential {
        name: String,
        #[arg(long)]
        reveal: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let client = Client::from_config(&config)?;

    let (audit, shipper) = AuditLogLayer::for_client(&client, config.session);
    let mut telemetry = TelemetryConfig::new("ats");
    telemetry.endpoint = config.otel_endpoint.clone();
    telemetry.default_filter = config.log_level.clone();
    telemetry.audit = Some(audit);
    let _guard = init_telemetry(telemetry)?;

    let result = run(cli.command, client, &config).await;
    if let Err(e) = &result {
        tracing::error!(error = format!("{e:#}"), "command failed");
    }

    if let Some(shipper) = shipper {
        let drained = tokio::time::timeout(SHIPPER_DRAIN_TIMEOUT, shipper.shutdown()).await;
        if drained.is_err() {
            tracing::warn!("gave up waiting for audit log records to be sent");
        }
    }
    result
}

/// How long to wait for queued audit records at exit.
const SHIPPER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

async fn run(command: Command, client: Client, config: &Config) -> anyhow::Result<()> {
    let server = AutomationServer::connect_with(client, config).await?;

    match command {
        Command::Info => cmd_info(&server).await,
        Command::Enqueue {
            reference,
            data,
            queue,
        } => cmd_enqueue(&server, reference, data, queue).await,
        Command::Clear {
            status,
            days_older_than,
            queue,
        } => cmd_clear(&server, status, days_older_than, queue).await,
        Command::Credential { name, reveal } => cmd_credential(&server, &name, reveal).await,
    }
}

fn queue_for(server: &AutomationServer, queue: Option<i64>) -> anyhow::Result<ats_client::Workqueue> {
    match queue {
        Some(id) => Ok(server.client().workqueue(WorkqueueId(id))),
        None => server
            .workqueue()
            .context("no work queue: pass --queue or set ATS_SESSION / ATS_WORKQUEUE_OVERRIDE"),
    }
}

async fn cmd_info(server: &AutomationServer) -> anyhow::Result<()> {
    println!("URL:        {}", server.client().base_url());
    match server.session() {
        Some(session) => {
            println!("Session:    {} ({})", session.id, session.status);
            println!("Resource:   {}", session.resource_id);
        }
        None => println!("Session:    -"),
    }
    match server.process() {
        Some(process) => println!("Process:    {} ({})", process.name, process.id),
        None => println!("Process:    -"),
    }
    match server.workqueue() {
        Ok(queue) => {
            let info = queue.info().await?;
            println!(
                "Workqueue:  {} ({}){}",
                info.name,
                info.id,
                if info.enabled { "" } else { " [disabled]" }
            );
        }
        Err(_) => println!("Workqueue:  -"),
    }
    Ok(())
}

async fn cmd_enqueue(
    server: &AutomationServer,
    reference: String,
    data: Option<String>,
    queue: Option<i64>,
) -> anyhow::Result<()> {
    let data: serde_json::Value = match data {
        Some(json) => serde_json::from_str(&json).context("--data is not valid JSON")?,
        None => serde_json::json!({}),
    };

    let queue = queue_for(server, queue)?;
    let item = queue.add_item(data, &reference).await?;
    println!("Added: {} (status: {})", item.id, item.status);
    Ok(())
}

async fn cmd_clear(
    server: &AutomationServer,
    status: Option<String>,
    days_older_than: Option<u32>,
    queue: Option<i64>,
) -> anyhow::Result<()> {
    let status: Option<Status> = status.map(|s| s.parse()).transpose()?;
    let queue = queue_for(server, queue)?;
    queue.clear(status, days_older_than).await?;
    println!("Cleared work queue {}", queue.id());
    Ok(())
}

async fn cmd_credential(server: &AutomationServer, name: &str, reveal: bool) -> anyhow::Result<()> {
    let credential = server.client().get_credential(name).await?;

    println!("ID:         {}", credential.id);
    println!("Name:       {}", credential.name);
    println!("Username:   {}", credential.username);
    if reveal {
        println!("Password:   {}", credential.password.expose_secret());
    } else {
        println!("Password:   ********");
    }
    if !credential.data.is_empty() {
        println!(
            "Data:       {}",
            serde_json::to_string_pretty(&credential.data)?
        );
    }
    Ok(())
}
