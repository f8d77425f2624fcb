//! leadflow CLI: runs the service and gives operators direct access to the queue.
//!
//! Queue locks live inside one process. `lead retry`, `lead retry-failed` and
//! `sync` drive the pipeline themselves, so run them only while `serve` is
//! stopped; against a live server use the `/queue/retry*` and `/sync` endpoints.

use clap::{Parser, Subcommand};
use leadflow::clients::Collaborators;
use leadflow::config::Config;
use leadflow::db::Db;
use leadflow::engine::{LeadPipeline, PipelineSettings, QueueWorker, SyncReconciler};
use leadflow::http::{self, AppState};
use leadflow::model::{EnqueueResult, Lead, LeadStatus};
use leadflow::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "leadflow", about = "Round-robin lead distribution")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and the queue worker
    Serve,
    /// Lead queue operations
    Lead {
        #[command(subcommand)]
        action: LeadAction,
    },
    /// Reconcile local leads against the spreadsheet (not while `serve` runs; use POST /sync)
    Sync {
        /// Only report how many leads are out of sync
        #[arg(long)]
        status: bool,
    },
    /// Queue and assignment statistics
    Stats,
}

#[derive(Subcommand)]
enum LeadAction {
    /// Queue a lead by its external id
    Add { external_id: String },
    /// List leads
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Maximum leads to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a lead
    Show { external_id: String },
    /// Reset a lead and process it now (not while `serve` runs; use POST /queue/retry/{id})
    Retry { external_id: String },
    /// Reset every failed lead to pending (not while `serve` runs; use POST /queue/retry-all)
    RetryFailed,
}

/// Everything a command needs, wired from config.
struct App {
    config: Config,
    db: Db,
    worker: QueueWorker,
}

impl App {
    async fn build(config: Config) -> anyhow::Result<Self> {
        let db = Db::connect(&config.database_url).await?;
        db.migrate().await?;

        let pipeline = LeadPipeline::new(
            db.lead_queue(config.worker.max_retries),
            db.assignment_ledger(config.roster.clone()),
            Collaborators::from_config(&config)?,
            PipelineSettings {
                primary_channel: config.messaging.primary_channel.clone(),
                source: config.lead_source.clone(),
            },
        );
        let worker = QueueWorker::new(pipeline, config.worker.clone());

        Ok(Self { config, db, worker })
    }

    fn reconciler(&self) -> SyncReconciler {
        SyncReconciler::new(self.worker.pipeline().clone(), self.config.sync_lead_delay)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "leadflow".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let app = App::build(config).await?;
    let result = match cli.command {
        Command::Serve => cmd_serve(&app).await,
        Command::Lead { action } => match action {
            LeadAction::Add { external_id } => cmd_lead_add(&app, &external_id).await,
            LeadAction::List { status, limit } => cmd_lead_list(&app, status, limit).await,
            LeadAction::Show { external_id } => cmd_lead_show(&app, &external_id).await,
            LeadAction::Retry { external_id } => cmd_lead_retry(&app, &external_id).await,
            LeadAction::RetryFailed => cmd_lead_retry_failed(&app).await,
        },
        Command::Sync { status } => cmd_sync(&app, status).await,
        Command::Stats => cmd_stats(&app).await,
    };

    app.db.close().await;
    result
}

async fn cmd_serve(app: &App) -> anyhow::Result<()> {
    let state = AppState::new(
        app.worker.clone(),
        app.reconciler(),
        app.config.verify_token.clone(),
        app.config.operator_api_key.clone(),
    );

    let worker = app.worker.clone();
    let worker_task = tokio::spawn(async move { worker.run().await });

    let listener = tokio::net::TcpListener::bind(app.config.bind_addr).await?;
    let shutdown_worker = app.worker.clone();
    http::serve(listener, state, async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown requested");
        shutdown_worker.shutdown();
    })
    .await?;

    worker_task.await?;
    Ok(())
}

async fn cmd_lead_add(app: &App, external_id: &str) -> anyhow::Result<()> {
    match app.worker.pipeline().queue().enqueue(external_id, None).await? {
        EnqueueResult::Created(lead) => println!("Queued: {} (id: {})", lead.external_id, lead.id),
        EnqueueResult::Existing(lead) => {
            println!("Already queued: {} (status: {})", lead.external_id, lead.status)
        }
    }
    Ok(())
}

async fn cmd_lead_list(app: &App, status: Option<String>, limit: i64) -> anyhow::Result<()> {
    let queue = app.worker.pipeline().queue();
    let leads = match status {
        Some(s) => {
            let status: LeadStatus = s.parse()?;
            queue.list_by_status(status, Some(limit)).await?
        }
        None => queue.list_recent(limit).await?,
    };

    if leads.is_empty() {
        println!("No leads found.");
        return Ok(());
    }

    println!(
        "{:<24}  {:<10}  {:<3}  {:<24}  CREATED",
        "EXTERNAL_ID", "STATUS", "TRY", "CONTACT"
    );
    println!("{}", "-".repeat(84));

    for lead in &leads {
        println!(
            "{:<24}  {:<10}  {:<3}  {:<24}  {}",
            truncate(&lead.external_id, 24),
            lead.status,
            lead.attempts,
            truncate(lead.contact_name().unwrap_or("-"), 24),
            lead.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} lead(s)", leads.len());
    Ok(())
}

async fn cmd_lead_show(app: &App, external_id: &str) -> anyhow::Result<()> {
    let lead = app.worker.pipeline().queue().require(external_id).await?;
    print_lead(&lead);
    Ok(())
}

async fn cmd_lead_retry(app: &App, external_id: &str) -> anyhow::Result<()> {
    let lead = app.worker.retry_one(external_id).await?;
    print_lead(&lead);
    Ok(())
}

async fn cmd_lead_retry_failed(app: &App) -> anyhow::Result<()> {
    let reset = app.worker.retry_failed().await?;
    println!("Reset {} failed lead(s) to pending", reset.len());
    Ok(())
}

async fn cmd_sync(app: &App, status_only: bool) -> anyhow::Result<()> {
    let reconciler = app.reconciler();
    if status_only {
        let status = reconciler.status().await?;
        println!("Local leads:   {}", status.local_leads);
        println!("Sheet rows:    {}", status.sheet_rows);
        println!("Pending sync:  {}", status.pending_sync);
        return Ok(());
    }

    let report = reconciler.run().await?;
    for detail in &report.details {
        println!(
            "{:<24}  {:<18}  {}",
            truncate(&detail.external_id, 24),
            format!("{:?}", detail.outcome),
            detail
                .reason
                .as_deref()
                .or(detail.contact.as_deref())
                .unwrap_or("-")
        );
    }
    println!(
        "\nSynced: {}  Already in sheets: {}  Failed: {}",
        report.synced, report.already_in_sheets, report.failed
    );
    Ok(())
}

async fn cmd_stats(app: &App) -> anyhow::Result<()> {
    let pipeline = app.worker.pipeline();
    let queue = pipeline.queue().stats().await?;
    let ledger = pipeline.ledger().stats().await?;

    println!("Leads:        {}", queue.total);
    println!("  pending:    {}", queue.pending);
    println!("  processing: {}", queue.processing);
    println!("  completed:  {}", queue.completed);
    println!("  failed:     {} ({} retryable)", queue.failed, queue.retryable);
    println!("---");
    println!("Assignments:  {}", ledger.total);
    for (agent, count) in &ledger.counters {
        println!("  {agent:<10} {count}");
    }
    println!("Last agent:   {}", ledger.last_agent);
    Ok(())
}

fn print_lead(lead: &Lead) {
    println!("External ID: {}", lead.external_id);
    println!("ID:          {}", lead.id);
    println!("Status:      {}", lead.status);
    println!("Attempts:    {}", lead.attempts);
    println!("Created:     {}", lead.created_at);
    if let Some(at) = lead.last_attempt_at {
        println!("Last try:    {at}");
    }
    if let Some(at) = lead.processed_at {
        println!("Processed:   {at}");
    }
    if let Some(ref err) = lead.last_error {
        println!("Last error:  {err}");
    }
    if let Some(ref data) = lead.fetched_data {
        println!("---");
        println!("Contact:     {}", data.name);
        println!("Phone:       {}", data.phone);
        println!("City:        {}", data.city);
        println!("Product:     {}", data.product);
    }
    let r = lead.results;
    println!("---");
    println!(
        "Fetched: {}  Primary: {}  Agent: {}  Recorded: {}",
        r.data_fetched, r.notified_primary, r.notified_agent, r.recorded
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max - 1).chain(std::iter::once('…')).collect()
    } else {
        s.to_string()
    }
}
