use std::path::PathBuf;

use clap::Parser;
use ytdl_service::config::ServiceConfig;
use ytdl_service::logging;

/// HTTP service that downloads YouTube videos through yt-dlp
#[derive(Debug, Parser)]
#[command(name = "ytdl-service", version, about)]
struct Args {
    /// Path to config.toml (default: <config_dir>/ytdl-service/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides config and YTDL_BIND
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(err) = run(args).await {
        eprintln!("ytdl-service error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    logging::init_logging(config.log_file.as_deref())?;
    ytdl_service::serve(config).await
}
