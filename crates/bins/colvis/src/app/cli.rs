use crate::app::{args::SubCommand, Config, ColvisError};

/// ANSI color codes.
pub mod ansi {
    pub const BRIGHT_CYAN: &str = "\u{001b}[36m";
    pub const BRIGHT_YELLOW: &str = "\u{001b}[33m";
    pub const RESET: &str = "\u{001b}[0m";

    pub const CYAN_CHECK: &str = "\u{001b}[36m✓\u{001b}[0m";
    pub const YELLOW_GT: &str = "\u{001b}[33m>\u{001b}[0m";
}

mod cmd_offline;
mod cmd_realtime;

pub use cmd_offline::OfflineOptions;
pub use cmd_realtime::RealtimeOptions;

/// Entry point of the collision visualiser CLI.
pub fn run(cmd: SubCommand, config: Config) -> Result<(), ColvisError> {
    match cmd {
        SubCommand::Offline(opts) => cmd_offline::offline(opts, config),
        SubCommand::Realtime(opts) => cmd_realtime::realtime(opts, config),
    }
}
