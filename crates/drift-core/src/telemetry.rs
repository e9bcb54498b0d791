//! Tracing setup for the drift binaries.
//!
//! Log lines go to stderr so that `drift extract`, `drift diff` and the
//! JSON report outputs stay clean on stdout.
//!
//! Filtering, first match wins:
//!
//! 1. `DRIFT_LOG`, an `EnvFilter` directive string
//! 2. `RUST_LOG`
//! 3. the level passed by the binary, with the HTTP and HTML parsing
//!    crates held at `warn`

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the drift log filter.
pub const LOG_ENV: &str = "DRIFT_LOG";

/// Dependencies that log every connection or parse step at debug level.
const QUIET_DEPENDENCIES: [&str; 4] = ["hyper", "reqwest", "html5ever", "selectors"];

/// Filter used when neither `DRIFT_LOG` nor `RUST_LOG` is set.
pub fn default_directives(level: Level) -> String {
    let mut directives = level.as_str().to_ascii_lowercase();
    for target in QUIET_DEPENDENCIES {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

fn filter_directives(level: Level, lookup: impl Fn(&str) -> Option<String>) -> String {
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(&lookup)
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_directives(level))
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON with the current span (the run id
///   of a drift run) on every line
/// * `level`: verbosity when no filter variable is set
///
/// An unparsable filter is reported on stderr and replaced by the default.
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let directives = filter_directives(level, |name| std::env::var(name).ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|err| {
        eprintln!("ignoring invalid log filter {directives:?}: {err}");
        EnvFilter::new(default_directives(level))
    });

    let (json_layer, text_layer) = if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(false)
            .with_writer(std::io::stderr);
        (Some(layer), None)
    } else {
        let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}
