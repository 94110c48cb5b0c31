mod client;
mod db;
mod domain;
mod error;
mod merge;
mod server;
mod service;
mod settings;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use settings::Settings;

#[derive(Parser)]
#[command(name = "scrape_dashboard", about = "Store and browse scraped website contacts")]
struct Cli {
    /// SQLite database path (default: $DASH_DB_PATH or data/dashboard.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (default: $DASH_BIND or 127.0.0.1:3000)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// POST a JSON payload file (object or array of objects) to a running server
    Submit {
        file: PathBuf,
        /// Server base URL (default: $DASH_SERVER_URL)
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Stored websites overview table
    List {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Print one stored website as JSON
    Show { id: i64 },
    /// Show record counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let db_path = cli.db.unwrap_or(settings.db_path);

    let result = match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or(settings.bind);
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("Invalid bind address {:?}", bind))?;
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            tracing::info!(db = ?db_path, "Database ready");
            server::serve(addr, Arc::new(Mutex::new(conn))).await
        }
        Commands::Submit { file, server } => {
            let server = server.unwrap_or(settings.server_url);
            let payloads = client::read_payloads(&file)?;
            if payloads.is_empty() {
                println!("No submissions in {:?}.", file);
                return Ok(());
            }
            println!("Submitting {} payloads to {}...", payloads.len(), server);
            let stats = client::submit_all(&server, payloads).await?;
            println!(
                "Done: {} submitted ({} created, {} merged, {} rejected).",
                stats.total, stats.created, stats.merged, stats.rejected
            );
            Ok(())
        }
        Commands::List { limit } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let rows = service::list(&conn)?;
            if rows.is_empty() {
                println!("No websites stored yet.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<32} | {:>6} | {:>6} | {:>5} | {:<20}",
                "id", "Domain", "Phones", "Emails", "Links", "Updated"
            );
            println!("{}", "-".repeat(90));

            for r in rows.iter().take(limit) {
                println!(
                    "{:>4} | {:<32} | {:>6} | {:>6} | {:>5} | {:<20}",
                    r.id.unwrap_or_default(),
                    truncate(&r.domain, 32),
                    r.phone.len(),
                    r.email.len(),
                    r.other_links.len(),
                    r.updated_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }

            println!("\n{} of {} websites", rows.len().min(limit), rows.len());
            Ok(())
        }
        Commands::Show { id } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let record = service::show(&conn, id)?;
            let view = service::WebsiteView::from(record);
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let s = service::stats(&conn)?;
            println!("Websites: {}", s.websites);
            println!("Phones:   {}", s.phones);
            println!("Emails:   {}", s.emails);
            println!("Links:    {}", s.links);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
