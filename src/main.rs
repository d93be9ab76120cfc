use anyhow::Result;
use tracing::{error, info};

mod browser;
mod capture;
mod cli;
mod dispatch;
mod frontend;
mod server;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::parse_args();

    // Initialize logging
    utils::init_logging(args.verbose, args.log_file.as_deref())?;

    info!("Starting webshot v{}", env!("CARGO_PKG_VERSION"));

    // Process commands
    match cli::process_command(args).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            Err(e)
        }
    }
}
