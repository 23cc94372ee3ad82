use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rtd")]
#[command(about = "Runtime-domain reconciler CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> region overrides -> local)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Inspect runtime domains (read-only)
    Domains {
        #[command(subcommand)]
        cmd: DomainsCmd,
    },

    /// Drive reconciliation by hand
    Reconcile {
        #[command(subcommand)]
        cmd: ReconcileCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum DomainsCmd {
    /// List records, oldest first. Filters are ANDed.
    List {
        /// Desired state (ACTIVE | INACTIVE | DELETED)
        #[arg(long)]
        state: Option<String>,

        /// Phase (CREATING | CREATED | DELETING | DELETED)
        #[arg(long)]
        phase: Option<String>,

        /// Application id
        #[arg(long)]
        app: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReconcileCmd {
    /// Run exactly one tick against the database and print the report as JSON.
    Tick {
        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = rtd_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = rtd_db::status(&pool).await?;
                    println!("db_ok={} has_domains_table={}", s.ok, s.has_domains_table);
                }
                DbCmd::Migrate => {
                    rtd_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rtd_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Domains { cmd } => match cmd {
            DomainsCmd::List { state, phase, app } => {
                let filter = commands::parse_filter(state.as_deref(), phase.as_deref(), app)?;
                commands::domains::list(&filter).await?;
            }
        },

        Commands::Reconcile { cmd } => match cmd {
            ReconcileCmd::Tick { config_paths } => {
                commands::reconcile::tick_once(&config_paths).await?;
            }
        },
    }

    Ok(())
}
