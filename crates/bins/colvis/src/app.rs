use args::CliArgs;
use std::{io::Write, time::SystemTime};

pub(crate) mod args;
pub mod cli;
mod config;
mod error;
pub mod scene;

pub use config::*;
pub use error::ColvisError;

/// Main entry point of the collision visualiser.
pub fn run() -> Result<(), ColvisError> {
    let (args, launch_time) = parse_args::<CliArgs>();
    let log_level = if args.verbose { 4 } else { args.log_level };
    setup_logging(args.log_timestamp.then_some(launch_time), log_level);
    log::info!(
        "colvis launched at {} on {}.",
        chrono::DateTime::<chrono::Utc>::from(launch_time),
        std::env::consts::OS
    );

    let config = Config::load(args.config.as_deref())?;
    cli::run(args.command, config)
}

/// Parses the arguments, returns the arguments and the launch time.
pub fn parse_args<T: clap::Parser>() -> (T, SystemTime) { (T::parse(), SystemTime::now()) }

/// Converts a log level to a log filter.
pub fn log_filter_from_level(level: u8) -> log::LevelFilter {
    match level {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Initialises logging settings.
///
/// # Arguments
///
/// * `timestamp` - Whether to print the timestamp in the log; This is the base
///   time for the timestamp.
/// * `log_level` - The log level to filter. See [`log_filter_from_level`] for
///   more details.
pub fn setup_logging(timestamp: Option<SystemTime>, log_level: u8) {
    env_logger::builder()
        .format(move |buf, record| {
            let top_level_module = record
                .module_path()
                .and_then(|path| path.split("::").next())
                .unwrap_or("?");
            match timestamp {
                Some(timestamp) => {
                    let duration = timestamp.elapsed().unwrap_or_default();
                    let millis = duration.as_millis() % 1000;
                    let seconds = duration.as_secs() % 60;
                    let minutes = (duration.as_secs() / 60) % 60;
                    let hours = (duration.as_secs() / 60) / 60;
                    writeln!(
                        buf,
                        "{}:{}:{}.{:03} {:5} [{}]: {}",
                        hours,
                        minutes,
                        seconds,
                        millis,
                        record.level(),
                        top_level_module,
                        record.args()
                    )
                },
                None => {
                    writeln!(
                        buf,
                        "{:5} [{}]: {}",
                        record.level(),
                        top_level_module,
                        record.args()
                    )
                },
            }
        })
        .filter_level(log_filter_from_level(log_level))
        .init();
}
