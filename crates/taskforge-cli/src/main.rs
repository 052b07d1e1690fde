mod config;
mod dispatch_cmd;
mod serve_cmd;
mod status_cmd;
mod submit_cmd;
mod transition_cmd;
mod worker_cmd;

use clap::{Parser, Subcommand};

use taskforge_db::pool;

use config::TaskforgeConfig;

#[derive(Parser)]
#[command(name = "taskforge", about = "Distributed task scheduler")]
struct Cli {
    /// Database URL (overrides TASKFORGE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a taskforge config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/taskforge")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the taskforge database (requires config file or env vars)
    DbInit,
    /// Submit a new task
    Submit {
        /// Task type tag
        #[arg(long = "type")]
        task_type: String,
        /// JSON payload, e.g. '{"to":"x"}'
        #[arg(long, default_value = "{}")]
        data: String,
        /// Priority: high, medium, or low (default: medium)
        #[arg(long)]
        priority: Option<String>,
        /// Dependency task ids (repeatable)
        #[arg(long = "depends-on")]
        dependencies: Vec<i64>,
        /// Max attempts before permanent failure (default: 3)
        #[arg(long)]
        max_retries: Option<i32>,
    },
    /// List all tasks
    List,
    /// Show a single task's full record
    Get {
        /// Task id
        id: i64,
    },
    /// Report a task's new status (worker-side)
    Transition {
        /// Task id
        id: i64,
        /// New status: running, completed, or failed
        status: String,
        /// Error message (required for `failed`)
        #[arg(long)]
        error_message: Option<String>,
    },
    /// Long-poll for the next eligible task (worker-side)
    Next {
        /// Timeout in milliseconds
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
    /// Send a worker heartbeat
    Heartbeat {
        /// Worker id
        worker_id: String,
    },
    /// List currently-live workers
    Workers,
    /// Run the reference HTTP transport
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run the reference dispatch loop: reconcile, then claim eligible
    /// tasks as they become available
    Dispatch {
        /// Long-poll timeout per `next` call, in milliseconds
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
}

/// Execute the `taskforge init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `taskforge db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `taskforge db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = TaskforgeConfig::resolve(cli_db_url);

    println!("Initializing taskforge database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool, pool::default_migrations_path()).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;
    println!("taskforge db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Submit {
            task_type,
            data,
            priority,
            dependencies,
            max_retries,
        } => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = submit_cmd::run_submit(
                &db_pool,
                &task_type,
                &data,
                priority.as_deref(),
                dependencies,
                max_retries,
            )
            .await;
            db_pool.close().await;
            result?;
        }
        Commands::List => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = status_cmd::run_list(&db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Get { id } => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = status_cmd::run_get(&db_pool, id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Transition {
            id,
            status,
            error_message,
        } => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result =
                transition_cmd::run_transition(&db_pool, id, &status, error_message.as_deref())
                    .await;
            db_pool.close().await;
            result?;
        }
        Commands::Next { timeout_ms } => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = transition_cmd::run_next(&db_pool, timeout_ms).await;
            db_pool.close().await;
            result?;
        }
        Commands::Heartbeat { worker_id } => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = worker_cmd::run_heartbeat(&db_pool, &worker_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Workers => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = worker_cmd::run_list_workers(&db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            serve_cmd::run_serve(db_pool, &bind, port).await?;
        }
        Commands::Dispatch { timeout_ms } => {
            let resolved = TaskforgeConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            dispatch_cmd::run_dispatch(&db_pool, timeout_ms).await?;
        }
    }

    Ok(())
}
