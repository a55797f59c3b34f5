// CLI modules
mod args;
mod op;
mod ops;
mod render;

// State, persistence and terminal I/O
mod backend;
mod process;
mod prompt;
mod session;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Cancel, Init, List, Refresh, Save, Search, Set, Show, Version};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

command_enum! {
    (Init, Init),
    (List, List),
    (Search, Search),
    (Refresh, Refresh),
    (Set, Set),
    (Show, Show),
    (Cancel, Cancel),
    (Save, Save),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Guard flushes the log file on exit
    let _guard = process::init_logging(args.config_path.as_deref(), args.verbose);

    let cancel = CancellationToken::new();
    let interrupt = process::utils::cancel_on_interrupt(cancel.clone());

    let ctx = op::OpContext::new(args.config_path.clone(), args.decision(), cancel.clone());
    let span = tracing::info_span!("command", name = args.command.name());
    let result = args.command.execute(&ctx).instrument(span).await;

    // stop the Ctrl-C listener
    cancel.cancel();
    let _ = interrupt.await;

    match result {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
