use clap::Parser;

use tenant_proxy::lifecycle::{startup, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = startup::run(cli).await {
        // Logging may not be up yet.
        eprintln!("tenant-proxy: {e}");
        tracing::error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}
