//! Structured telemetry initialisation for embedders.
//!
//! Engine builds run on threads named `stitch-build`, and every line carries
//! the thread name so interleaved builds can be told apart. ABI contract
//! violations are always reported, whatever the configured filter says.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use stitch_config::{Config, LogFormat};
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::{self, MakeWriter};

/// Directive appended to every filter so contract violations are never muted.
const CONTRACT_DIRECTIVE: &str = "stitch_abi::contract=error";

static TELEMETRY_GUARD: OnceCell<LogFormat> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the subscriber that is actually installed, which is the one
    /// requested by the first successful call.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs a global `tracing` subscriber for engine and binding events.
///
/// Only the first call installs anything; later calls return a handle naming
/// the format already in place. Embedders that already run their own
/// subscriber should not call this at all.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the configured filter does not
/// parse, or [`TelemetryError::Subscriber`] when another global subscriber is
/// already installed.
///
/// # Examples
///
/// ```rust
/// use stitch::telemetry;
/// use stitch_config::{Config, LogFormat};
///
/// # fn main() -> Result<(), stitch::telemetry::TelemetryError> {
/// let config = Config::default().with_log_filter("stitch_engine=debug");
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config.with_log_format(LogFormat::Json))?;
/// assert_eq!(second.format(), first.format());
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|format| TelemetryHandle { format: *format })
}

fn install_subscriber(config: &Config) -> Result<LogFormat, TelemetryError> {
    let subscriber = subscriber(config, io::stderr, io::stderr().is_terminal())?;
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(config.log_format())
}

fn filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    let invalid = |error: &dyn std::error::Error| TelemetryError::Filter(error.to_string());
    let contract: Directive = CONTRACT_DIRECTIVE.parse().map_err(|error| invalid(&error))?;
    Ok(EnvFilter::try_new(config.log_filter())
        .map_err(|error| invalid(&error))?
        .add_directive(contract))
}

/// Builds the subscriber `initialise` installs, writing through `writer`.
fn subscriber<W>(
    config: &Config,
    writer: W,
    ansi: bool,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter(config)?)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(if config.log_format().is_structured() {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        Box::new(builder.compact().finish())
    })
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread;

    use rstest::rstest;
    use stitch_config::{Config, LogFormat};
    use tracing::{error, info};
    use tracing_subscriber::fmt::MakeWriter;

    use super::{TelemetryError, subscriber};

    /// Collects everything the subscriber writes.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Emits `emit` on a thread named like an engine build thread.
    fn capture_on_build_thread(config: &Config, emit: impl FnOnce() + Send + 'static) -> String {
        let capture = Capture::default();
        let installed = subscriber(config, capture.clone(), false).expect("valid filter");
        thread::Builder::new()
            .name(String::from("stitch-build"))
            .spawn(move || tracing::subscriber::with_default(installed, emit))
            .expect("spawn")
            .join()
            .expect("emitter finished");
        capture.text()
    }

    #[rstest]
    fn compact_lines_name_the_build_thread() {
        let config = Config::default().with_log_filter("stitch_engine=debug");
        let text = capture_on_build_thread(&config, || {
            info!(target: "stitch_engine::context", outputs = 2, "build finished");
        });

        assert!(text.contains("stitch-build"), "{text}");
        assert!(text.contains("stitch_engine::context"), "{text}");
        assert!(text.contains("build finished"), "{text}");
    }

    #[rstest]
    fn json_lines_carry_thread_and_fields() {
        let config = Config::default()
            .with_log_filter("stitch_engine=debug")
            .with_log_format(LogFormat::Json);
        let text = capture_on_build_thread(&config, || {
            info!(target: "stitch_engine::context", outputs = 2, "build finished");
        });

        assert!(text.contains(r#""threadName":"stitch-build""#), "{text}");
        assert!(text.contains(r#""message":"build finished""#), "{text}");
        assert!(text.contains(r#""outputs":2"#), "{text}");
    }

    #[rstest]
    fn contract_violations_pass_a_silent_filter() {
        let config = Config::default().with_log_filter("off");
        let text = capture_on_build_thread(&config, || {
            info!(target: "stitch_engine::context", "build finished");
            error!(target: "stitch_abi::contract", "ABI contract violated");
        });

        assert!(text.contains("ABI contract violated"), "{text}");
        assert!(!text.contains("build finished"), "{text}");
    }

    #[rstest]
    fn malformed_filters_are_rejected() {
        let config = Config::default().with_log_filter("stitch_engine=loud");
        let error = subscriber(&config, Capture::default(), false)
            .err()
            .expect("invalid filter");
        assert!(matches!(error, TelemetryError::Filter(_)), "{error}");
    }
}
