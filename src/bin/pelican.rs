//! pelican: federation client CLI
//!
//! Read objects and inspect routing decisions for a Pelican federation.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pelican_client::{EntryKind, FederationConfig, ObjectInfo, PelicanFileSystem};

/// Pelican federation client
#[derive(Parser)]
#[command(name = "pelican")]
#[command(version)]
#[command(about = "Pelican federation client")]
struct Args {
    /// Federation discovery URL (e.g. pelican://osg-htc.org)
    #[arg(short, long, env = "PELICAN_FEDERATION_URL")]
    federation: Option<String>,

    /// Config file (default: ~/.pelican/config.toml, then /etc/pelican/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read from origins instead of caches
    #[arg(long)]
    direct_reads: bool,

    /// Cache to try first; repeat for more, "+" for the discovered caches
    #[arg(long = "preferred-cache")]
    preferred_caches: Vec<String>,

    /// Authorization header value
    #[arg(long, env = "PELICAN_AUTHORIZATION", hide_env_values = true)]
    authorization: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print an object to stdout
    Cat {
        /// Object path or pelican:// URL
        path: String,
    },

    /// Show object metadata
    Stat {
        path: String,
    },

    /// List a directory
    Ls {
        path: String,
        /// Show size and type
        #[arg(short, long)]
        long: bool,
    },

    /// Download an object
    Get {
        path: String,
        /// Destination file
        dest: PathBuf,
    },

    /// Show the origin URL the director reports
    Origin {
        path: String,
    },

    /// Show the caches the director ranks for a path
    Caches {
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = apply_overrides(FederationConfig::load(args.config.as_deref())?, &args);
    let fs = PelicanFileSystem::from_config(&config)?;

    match args.command {
        Command::Cat { path } => {
            let bytes = fs.cat_file(&path).await?;
            io::stdout().lock().write_all(&bytes)?;
        }
        Command::Stat { path } => {
            let info = fs.info(&path).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Ls { path, long } => {
            for entry in fs.ls(&path).await? {
                if long {
                    println!("{}", format_long(&entry));
                } else {
                    println!("{}", entry.name);
                }
            }
        }
        Command::Get { path, dest } => {
            let bytes = fs.get_file(&path, &dest).await?;
            eprintln!("wrote {bytes} bytes to {}", dest.display());
        }
        Command::Origin { path } => {
            println!("{}", fs.origin_url(&path).await?);
        }
        Command::Caches { path } => {
            let discovered = fs.cache_candidates(&path).await?;
            println!("namespace: {}", discovered.namespace);
            println!("require token: {}", discovered.require_token);
            for (rank, url) in discovered.candidates.iter().enumerate() {
                println!("  {}. {url}", rank + 1);
            }
        }
    }

    Ok(())
}

/// Command-line flags win over the config file.
fn apply_overrides(mut config: FederationConfig, args: &Args) -> FederationConfig {
    if let Some(federation) = &args.federation {
        config.discovery_url = Some(federation.clone());
    }
    if args.direct_reads {
        config.direct_reads = true;
    }
    if !args.preferred_caches.is_empty() {
        config.preferred_caches = args.preferred_caches.clone();
    }
    if let Some(authorization) = &args.authorization {
        config.authorization = Some(authorization.clone());
    }
    config
}

fn format_long(entry: &ObjectInfo) -> String {
    let kind = match entry.kind {
        EntryKind::Directory => 'd',
        EntryKind::File => '-',
    };
    let size = entry
        .size
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{kind} {size:>12} {}", entry.name)
}
