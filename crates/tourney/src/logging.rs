//! Tracing setup for the driver.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set, from a `TOURNEY_LOG` level.
pub fn default_filter(tourney_log: Option<&str>) -> String {
    let level = match tourney_log {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("tourney={level},peterson={level}")
}

/// Initialize tracing with TOURNEY_LOG and LOG_FORMAT support.
///
/// Logs go to stderr so stdout carries only participant output.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let tourney_log = std::env::var("TOURNEY_LOG").ok();
        EnvFilter::new(default_filter(tourney_log.as_deref()))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
