use crate::app::cli::{OfflineOptions, RealtimeOptions};
use std::path::PathBuf;

/// Collision visualiser command line interface arguments.
#[derive(clap::Parser, Debug)]
#[clap(
    author,
    version,
    about = "Visualises the collision scene of a world by casting rays through it."
)]
pub struct CliArgs {
    /// Whether to print verbose information to stdout.
    #[clap(short, long, help = "Use verbose output (log level = 4)")]
    pub verbose: bool,

    /// Whether to show the timestamp in the log.
    #[clap(
        long,
        help = "Show timestamp for each log message in seconds since\nprogram starts"
    )]
    pub log_timestamp: bool,

    /// Verbosity level for the log.
    #[clap(
        long,
        help = "Setting logging verbosity level (higher for more\ndetails)\n  0 - error\n  1 - \
                warn + error\n  2 - info + warn + error\n  3 - debug + info + warn + error\n  4 - \
                trace + debug + info + warn + error\n\x08",
        default_value_t = 1
    )]
    pub log_level: u8,

    /// Command to execute.
    #[clap(subcommand)]
    pub command: SubCommand,

    /// Path to the user config file. If not specified, `colvis.toml` in the
    /// current working directory is used when present.
    #[clap(short, long, help = "Path to the user config file")]
    pub config: Option<PathBuf>,
}

/// Collision visualiser command.
#[derive(clap::Subcommand, Debug)]
pub enum SubCommand {
    /// Traces a complete image or cube map and writes it to disk.
    Offline(OfflineOptions),

    /// Runs the progressive visualisation for a number of frames.
    Realtime(RealtimeOptions),
}
