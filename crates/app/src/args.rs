use clap::Parser;

use std::path::PathBuf;

use common::decide::Decision;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Review and edit the permission claims of identity-provider users")]
pub struct Args {
    /// Path to the warden state directory (defaults to ~/.warden)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Keep the local version on every conflict
    #[arg(long, global = true, conflicts_with = "no")]
    pub yes: bool,

    /// Take the remote version on every conflict
    #[arg(long, global = true)]
    pub no: bool,

    #[command(subcommand)]
    pub command: crate::Command,
}

impl Args {
    pub fn decision(&self) -> Option<Decision> {
        match (self.yes, self.no) {
            (true, _) => Some(Decision::KeepLocal),
            (_, true) => Some(Decision::TakeRemote),
            _ => None,
        }
    }
}
