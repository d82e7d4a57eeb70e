use std::path::PathBuf;

use clap::Parser;

/// stemsplit - audio stem-separation server
#[derive(Parser, Debug)]
#[command(name = "stemsplit", version, about = "Audio stem-separation server")]
struct Cli {
    /// Host to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Data directory path
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = stemsplit::app::serve(
        cli.host.as_deref(),
        cli.port,
        cli.data_dir.as_deref(),
    )
    .await
    {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
