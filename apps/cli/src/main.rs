//! Daybook command line.
//!
//! Local record keeping plus multi-device sync through a shared blob store.
//! Records work without any remote configured; the sync commands need either
//! `--remote-url` (HTTP object store) or `--remote-dir` (shared folder).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use daybook_blob_store::{FsBlobStore, HttpBlobStore};
use daybook_core::records::{
    CategoryRepositoryTrait, Entry, EntryRepositoryTrait, EntryUpdate, GoalRepositoryTrait,
    NewCategory, NewEntry, NewGoal,
};
use daybook_core::sync::{
    jittered_delay_ms, BlobTransport, SyncEngine, SyncReport, SyncStatus,
    DEFAULT_OPERATION_RETENTION_DAYS,
};
use daybook_storage_sqlite as storage;
use storage::{CategoryRepository, EntryRepository, GoalRepository};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Personal records with multi-device sync", version)]
struct Cli {
    /// Data directory holding the database (defaults to the platform data dir)
    #[arg(long, env = "DAYBOOK_DATA_DIR", value_name = "PATH", global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL of the remote HTTP object store
    #[arg(long, env = "DAYBOOK_REMOTE_URL", value_name = "URL", global = true)]
    remote_url: Option<String>,

    /// Access token for the HTTP object store
    #[arg(long, env = "DAYBOOK_REMOTE_TOKEN", value_name = "TOKEN", global = true)]
    remote_token: Option<String>,

    /// Shared directory used as the remote store (e.g. a synced folder)
    #[arg(long, env = "DAYBOOK_REMOTE_DIR", value_name = "PATH", global = true)]
    remote_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a journal entry
    AddEntry {
        /// Entry title
        title: String,
        /// Entry body text
        #[arg(short, long, default_value = "")]
        body: String,
        /// Calendar day, YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// Category id to file the entry under
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List live entries, newest entry date first
    ListEntries,
    /// Edit an entry's fields
    EditEntry {
        /// Entry id
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        /// Calendar day, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// Category id; pass an empty string to clear it
        #[arg(long)]
        category: Option<String>,
    },
    /// Soft-delete an entry
    DeleteEntry {
        /// Entry id
        id: String,
    },
    /// Create a category
    AddCategory {
        /// Category name
        name: String,
        /// Display color, #rrggbb
        #[arg(long)]
        color: Option<String>,
    },
    /// List categories
    ListCategories,
    /// Create a goal
    AddGoal {
        /// Goal title
        title: String,
        /// Numeric target, e.g. 500
        #[arg(long)]
        target: Option<f64>,
        /// Unit the target is measured in, e.g. km
        #[arg(long)]
        unit: Option<String>,
    },
    /// List goals
    ListGoals,
    /// Push pending operations, then pull newer remote operations
    Sync,
    /// Upload pending operations only
    Push,
    /// Download and merge newer remote operations only
    Pull,
    /// Snapshot-push every live record, then pull everything
    FullSync,
    /// Re-upload every live record as one snapshot blob
    FullPush,
    /// Reset the cursor and merge every blob in the store
    FullPull,
    /// Show sync counters and cursor state
    Status,
    /// Reset the pull cursor so the next pull revisits every blob
    ResetCursor,
    /// Delete synced operations older than the retention window
    Cleanup {
        /// Retention window in days
        #[arg(long, default_value_t = DEFAULT_OPERATION_RETENTION_DAYS)]
        days: i64,
    },
    /// Permanently remove soft-deleted records older than the window
    Purge {
        /// Retention window in days
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Run sync on a periodic schedule until interrupted
    Watch,
}

struct App {
    entries: EntryRepository,
    categories: CategoryRepository,
    goals: GoalRepository,
    engine: SyncEngine,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daybook")
}

fn build_transport(cli: &Cli) -> anyhow::Result<Option<Arc<dyn BlobTransport>>> {
    match (&cli.remote_url, &cli.remote_dir) {
        (Some(_), Some(_)) => bail!("--remote-url and --remote-dir are mutually exclusive"),
        (Some(url), None) => {
            let token = cli.remote_token.as_deref().unwrap_or_default();
            let transport: Arc<dyn BlobTransport> = Arc::new(HttpBlobStore::new(url, token));
            Ok(Some(transport))
        }
        (None, Some(dir)) => {
            let transport: Arc<dyn BlobTransport> = Arc::new(FsBlobStore::new(dir.clone()));
            Ok(Some(transport))
        }
        (None, None) => Ok(None),
    }
}

fn build_app(cli: &Cli) -> anyhow::Result<App> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(default_data_dir)
        .to_string_lossy()
        .to_string();

    let db_path = storage::init(&data_dir).context("prepare data directory")?;
    storage::run_migrations(&db_path).context("run database migrations")?;
    let pool = storage::create_pool(&db_path).context("open database pool")?;
    let writer = storage::spawn_writer(pool.as_ref().clone());

    let engine = SyncEngine::new(
        Arc::new(storage::OperationLogRepository::new(
            pool.clone(),
            writer.clone(),
        )),
        Arc::new(storage::SyncMetadataRepository::new(
            pool.clone(),
            writer.clone(),
        )),
        Arc::new(storage::SqliteRecordStore::new(pool.clone(), writer.clone())),
        build_transport(cli)?,
    );

    Ok(App {
        entries: EntryRepository::new(pool.clone(), writer.clone()),
        categories: CategoryRepository::new(pool.clone(), writer.clone()),
        goals: GoalRepository::new(pool, writer),
        engine,
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_entry(entry: &Entry) {
    let pending = match entry.sync_status {
        SyncStatus::Pending => " *",
        SyncStatus::Synced => "",
    };
    println!("{}  {}{}", entry.entry_date, entry.title, pending);
    println!("    id: {}", entry.id);
    if let Some(category_id) = &entry.category_id {
        println!("    category: {category_id}");
    }
    if !entry.body.is_empty() {
        println!("    {}", entry.body);
    }
}

fn finish(report: SyncReport) -> anyhow::Result<()> {
    if report.is_success() {
        println!("{}", report.message);
        Ok(())
    } else {
        bail!(report.message)
    }
}

async fn run() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let app = build_app(&cli)?;

    match cli.command {
        Commands::AddEntry {
            title,
            body,
            date,
            category,
        } => {
            let entry = app
                .entries
                .insert_new_entry(NewEntry {
                    category_id: category,
                    title,
                    body,
                    entry_date: date
                        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string()),
                })
                .await?;
            println!("Added entry {}", entry.id);
        }
        Commands::ListEntries => {
            let entries = app.entries.list_entries()?;
            if entries.is_empty() {
                println!("No entries yet.");
            }
            for entry in &entries {
                print_entry(entry);
            }
        }
        Commands::EditEntry {
            id,
            title,
            body,
            date,
            category,
        } => {
            let existing = app
                .entries
                .get_entry(&id)?
                .with_context(|| format!("no entry with id {id}"))?;
            let update = EntryUpdate {
                id: existing.id.clone(),
                category_id: match category {
                    None => existing.category_id,
                    Some(value) if value.is_empty() => None,
                    Some(value) => Some(value),
                },
                title: title.unwrap_or(existing.title),
                body: body.unwrap_or(existing.body),
                entry_date: date.unwrap_or(existing.entry_date),
            };
            let entry = app.entries.update_entry(update).await?;
            println!("Updated entry {}", entry.id);
        }
        Commands::DeleteEntry { id } => {
            let affected = app.entries.delete_entry(id).await?;
            if affected == 0 {
                println!("Nothing to delete.");
            } else {
                println!("Deleted.");
            }
        }
        Commands::AddCategory { name, color } => {
            let category = app
                .categories
                .insert_new_category(NewCategory { name, color })
                .await?;
            println!("Added category {}", category.id);
        }
        Commands::ListCategories => {
            let categories = app.categories.list_categories()?;
            if categories.is_empty() {
                println!("No categories yet.");
            }
            for category in &categories {
                match &category.color {
                    Some(color) => println!("{}  {}  ({})", category.id, category.name, color),
                    None => println!("{}  {}", category.id, category.name),
                }
            }
        }
        Commands::AddGoal {
            title,
            target,
            unit,
        } => {
            let goal = app
                .goals
                .insert_new_goal(NewGoal {
                    title,
                    target_value: target,
                    unit,
                })
                .await?;
            println!("Added goal {}", goal.id);
        }
        Commands::ListGoals => {
            let goals = app.goals.list_goals()?;
            if goals.is_empty() {
                println!("No goals yet.");
            }
            for goal in &goals {
                let check = if goal.achieved { "x" } else { " " };
                let target = match (goal.target_value, &goal.unit) {
                    (Some(value), Some(unit)) => format!("  ({value} {unit})"),
                    (Some(value), None) => format!("  ({value})"),
                    _ => String::new(),
                };
                println!("[{check}] {}{target}", goal.title);
                println!("    id: {}", goal.id);
            }
        }
        Commands::Sync => finish(app.engine.incremental_sync().await)?,
        Commands::Push => finish(app.engine.incremental_push().await)?,
        Commands::Pull => finish(app.engine.incremental_pull().await)?,
        Commands::FullSync => finish(app.engine.force_full_sync().await)?,
        Commands::FullPush => finish(app.engine.force_full_push().await)?,
        Commands::FullPull => finish(app.engine.force_full_pull().await)?,
        Commands::Status => {
            let stats = app.engine.get_sync_stats().await?;
            println!("Device:      {}", stats.device_id);
            println!("Pending ops: {}", stats.pending_ops);
            println!("Synced ops:  {}", stats.synced_ops);
            println!("Cursor:      {}", stats.last_processed_timestamp);
            println!(
                "Last sync:   {}",
                stats.last_sync_time.as_deref().unwrap_or("never")
            );
        }
        Commands::ResetCursor => {
            app.engine.reset_sync_state().await?;
            println!("Pull cursor reset; the next pull revisits every blob.");
        }
        Commands::Cleanup { days } => {
            let removed = app.engine.cleanup_synced_operations(days).await?;
            println!("Removed {removed} synced operation(s) older than {days} day(s).");
        }
        Commands::Purge { days } => {
            let removed = app.engine.purge_deleted_records(days).await?;
            println!("Removed {removed} soft-deleted record(s) older than {days} day(s).");
        }
        Commands::Watch => loop {
            let report = app.engine.incremental_sync().await;
            if report.is_success() {
                println!("{}", report.message);
            } else {
                eprintln!("Sync failed: {}", report.message);
            }
            tokio::time::sleep(Duration::from_millis(jittered_delay_ms())).await;
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
}
