//! Tracing setup.
//!
//! Logs go to stderr so stdout stays clean for machine-readable command
//! output. Filtering comes from `CHAINWATCH_LOG` (default `info`);
//! `CHAINWATCH_LOG_FORMAT=json` switches to line-delimited JSON.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_env("CHAINWATCH_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("CHAINWATCH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
