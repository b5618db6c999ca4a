use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;
use crate::error::ConfigError;

const CRATE_TARGET: &str = "agents_quickstart";

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the settings. Verbose mode logs at `debug` on stdout
/// so the run trace interleaves with program output; otherwise logs go to
/// stderr.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), ConfigError> {
    let directive = filter_directive(settings, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive)
        .map_err(|err| ConfigError::Logging(format!("invalid filter `{directive}`: {err}")))?;

    let writer = if settings.verbose {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(writer))
        .try_init()
        .map_err(|err| ConfigError::Logging(err.to_string()))
}

fn filter_directive(settings: &LoggingSettings, rust_log: Option<String>) -> String {
    if let Some(directive) = rust_log.filter(|value| !value.trim().is_empty()) {
        return directive;
    }

    let level = if settings.verbose {
        "debug"
    } else {
        settings.level.trim()
    };
    format!("{CRATE_TARGET}={level}")
}
