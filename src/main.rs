use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::TimeDelta;
use tracing_subscriber::EnvFilter;

use mirror_orchestrator::api::types::MirrorItemDto;
use mirror_orchestrator::config::{DatabaseConfig, ServerConfig};
use mirror_orchestrator::mirror::{format_size, MirrorItem, EPOCH};
use mirror_orchestrator::orchestrator::{open_state, Orchestrator};
use mirror_orchestrator::scheduler::queue::DEFAULT_COOL_DOWN_SECS;
use mirror_orchestrator::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "mirror-orchestrator")]
#[command(version)]
#[command(about = "Hands periodic mirror sync jobs to remote workers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the orchestrator HTTP server
    Serve(ServeArgs),

    /// Print every mirror's saved status without serving
    Mirrors(MirrorsArgs),
}

#[derive(Parser, Debug)]
struct SourceArgs {
    /// Directory with one JSON file per mirror
    #[arg(long, default_value = "./conf")]
    conf_dir: PathBuf,

    /// SQLite database path, or ":memory:" for a throwaway store
    #[arg(long, default_value = "./orchestrator.db")]
    db: String,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5000")]
    listen: SocketAddr,

    #[command(flatten)]
    source: SourceArgs,

    /// Grace period after a job's timeout before its lease is given up
    #[arg(long, default_value_t = DEFAULT_COOL_DOWN_SECS)]
    cool_down_secs: i64,
}

#[derive(Parser, Debug)]
struct MirrorsArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

impl SourceArgs {
    fn server_config(&self, listen: SocketAddr) -> ServerConfig {
        ServerConfig::new(listen, self.conf_dir.clone())
            .with_database(DatabaseConfig::from_arg(&self.db))
    }
}

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.cool_down_secs < 0 {
        return Err("--cool-down-secs must not be negative".into());
    }

    let config = args
        .source
        .server_config(args.listen)
        .with_cool_down(TimeDelta::seconds(args.cool_down_secs));

    tracing::info!(
        listen_addr = %config.listen_addr,
        conf_dir = %config.conf_dir.display(),
        database = ?config.database,
        cool_down_secs = args.cool_down_secs,
        "Starting mirror-orchestrator"
    );

    let shutdown = install_shutdown_handler();
    Orchestrator::new(config)?.run(shutdown).await
}

fn list_mirrors(args: MirrorsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.source.server_config(ServerConfig::default().listen_addr);
    let state = open_state(&config)?;
    state.reload()?;
    let mirrors = state.get_all();

    match args.output {
        OutputFormat::Json => {
            let output: Vec<MirrorItemDto> = mirrors.iter().map(MirrorItemDto::from).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => print_mirror_table(&mirrors),
    }
    Ok(())
}

fn print_mirror_table(mirrors: &[MirrorItem]) {
    if mirrors.is_empty() {
        println!("No mirrors configured.");
        return;
    }

    println!(
        "{:<24} {:<10} {:<20} {:<20} SIZE",
        "ID", "STATUS", "LAST SYNC", "NEXT SYNC"
    );
    println!("{}", "-".repeat(88));
    for mirror in mirrors {
        println!(
            "{:<24} {:<10} {:<20} {:<20} {}",
            mirror.id(),
            mirror.saved.status,
            format_time(mirror.saved.last_sync_at),
            format_time(mirror.next_sync_at()),
            format_size(mirror.saved.size)
        );
    }
    println!();
    println!("{} mirrors", mirrors.len());
}

fn format_time(at: chrono::DateTime<chrono::Utc>) -> String {
    if at == EPOCH {
        "-".to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Serve(serve_args) => run_server(serve_args).await,
        Commands::Mirrors(mirrors_args) => list_mirrors(mirrors_args),
    }
}
