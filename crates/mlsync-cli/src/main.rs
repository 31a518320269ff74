use mlsync_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // File logging when the state dir is writable, stderr otherwise.
    if let Err(e) = logging::init_logging() {
        match logging::init_logging_stderr() {
            Ok(()) => tracing::warn!("file logging unavailable, using stderr: {:#}", e),
            Err(stderr_err) => eprintln!("mlsync: logging disabled: {:#}; {:#}", e, stderr_err),
        }
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("mlsync error: {:#}", err);
        std::process::exit(1);
    }
}
