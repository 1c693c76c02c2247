use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use pdbmux::driver::config::{Config, CONFIG_FILE};
use pdbmux::driver::SessionRegistry;
use pdbmux::ui::server::{FileTracer, Server};
use pdbmux::ui::transport::FramedTransport;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: pdbconfig.json in the current directory)
    #[clap(long, env = "PDBMUX_CONFIG")]
    config: Option<PathBuf>,

    /// Write diagnostics into a file instead of stderr.
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Trace requests and responses into the log file.
    /// Requires --log-file.
    #[clap(long)]
    trace: bool,

    /// Silence session driver logging.
    #[clap(long)]
    quiet: bool,
}

fn init_logger(args: &Args) -> anyhow::Result<()> {
    // stdout belongs to the transport
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stderr);
    if let Some(path) = &args.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();

    if args.quiet {
        pdbmux::log::quiet();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(&args)?;

    let config_path = args.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = Config::load(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;

    let tracer = match (&args.log_file, args.trace) {
        (Some(path), true) => Some(FileTracer::new(path)?),
        (None, true) => {
            warn!(target: "server", "--trace requires --log-file; tracing disabled");
            None
        }
        _ => None,
    };

    info!(target: "server", "pdbmux serves requests on stdio");
    let registry = Arc::new(SessionRegistry::new(config));
    Server::new(Arc::new(FramedTransport::stdio()), registry, tracer).run()
}
