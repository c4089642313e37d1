// ============================================================================
// transq-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: env_logger Initialization for the CLI
//
// The core library only emits records through the `log` facade. This module
// installs env_logger as the backend with a compact coloured format.
//
// USAGE:
// - default: info
// - `-v`: debug
// - RUST_LOG=transq_core=trace,ffmpeg_log=debug: per-target control, takes
//   precedence over both

use std::io::Write;

use console::style;
use log::LevelFilter;

/// Initializes the global logger. `verbose` raises the default level to debug.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_with_level(level);
}

pub fn init_with_level(level: LevelFilter) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let level_str = match record.level() {
                log::Level::Error => style("ERROR").red().bold(),
                log::Level::Warn => style("WARN ").yellow(),
                log::Level::Info => style("INFO ").green(),
                log::Level::Debug => style("DEBUG").blue(),
                log::Level::Trace => style("TRACE").magenta(),
            };
            writeln!(
                buf,
                "{} {} {}",
                style(buf.timestamp()).dim(),
                level_str,
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .try_init();

    match result {
        Ok(()) => log::debug!("Logger initialized with level: {}", level),
        Err(e) => eprintln!("Logger already initialized: {}", e),
    }
}
