use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

static LOG_ONCE: Once = Once::new();

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "ERT_LOG";

/// Filter used when `ERT_LOG` is unset: `RUST_LOG` if present, else the default level.
fn fallback_filter(rust_log: Option<String>, verbose: bool) -> String {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| level_to_str(default_level(verbose)).to_string())
}

fn level_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

/// Level used when neither the environment nor the command line says otherwise.
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialize stderr logging based on `ERT_LOG`, then `RUST_LOG`.
///
/// `verbose` raises the default to debug; an explicit environment filter wins.
/// Safe to call more than once, only the first call installs the logger.
pub fn init_logging(verbose: bool) {
    LOG_ONCE.call_once(|| {
        let fallback = fallback_filter(std::env::var("RUST_LOG").ok(), verbose);
        let env = Env::new().filter_or(LOG_ENV, fallback);
        env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(false)
            .init();
    });
}
