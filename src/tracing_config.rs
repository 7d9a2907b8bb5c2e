//! Tracing configuration for the command-line driver
//!
//! Library code only emits events and spans; the binary decides how they are
//! rendered by building a [`TracingConfig`] and calling [`TracingConfig::init`].

use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Crates that stay at `warn` unless an explicit filter says otherwise.
/// The AWS SDK and the HTTP stack log every request at debug.
const NOISY_TARGETS: &[&str] = &["aws_config", "aws_smithy_runtime", "aws_sdk_s3", "hyper", "reqwest", "rustls"];

/// Rendering of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored single-line output for interactive terminals
    #[default]
    Console,
    /// Colorless output for batch jobs whose stdout lands in a log file
    Plain,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

impl FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "plain" => Ok(Self::Plain),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for TracingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Console => "console",
            Self::Plain => "plain",
            #[cfg(feature = "tracing-json")]
            Self::Json => "json",
        })
    }
}

/// Subscriber settings for one CLI process
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// 0 = info, 1 = debug, 2+ = trace for this crate
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Raw `EnvFilter` directive; replaces the verbosity-derived filter entirely
    pub env_filter: Option<String>,
    /// Run id stamped on the first line so batch logs can be correlated
    pub session_id: Option<String>,
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive derived from the verbosity.
    ///
    /// Raising verbosity only affects this crate and unlisted dependencies;
    /// the SDK and HTTP crates stay at `warn`.
    pub fn filter_directive(&self) -> String {
        let level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut directive = level.to_string();
        for target in NOISY_TARGETS {
            directive.push_str(&format!(",{target}=warn"));
        }
        directive
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive in `env_filter`
    /// - A global subscriber was already installed
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let directive = self
            .env_filter
            .clone()
            .unwrap_or_else(|| self.filter_directive());
        let registry = Registry::default().with(EnvFilter::try_new(directive)?);

        match self.format {
            TracingFormat::Console => {
                registry
                    .with(fmt::layer().with_target(false).compact())
                    .try_init()?;
            },
            TracingFormat::Plain => {
                registry
                    .with(fmt::layer().with_ansi(false).with_target(true))
                    .try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                registry
                    .with(fmt::layer().json().with_current_span(true))
                    .try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, format = %self.format, "🚀 vton-forge session started");
        }
        Ok(())
    }
}

/// Install the CLI subscriber and return the generated session id
///
/// # Errors
/// - Same as [`TracingConfig::init`]
pub fn init_cli_tracing(
    verbosity: u8,
    format: TracingFormat,
    env_filter: Option<&str>,
) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone());
    if let Some(filter) = env_filter {
        config = config.with_env_filter(filter);
    }
    config.init()?;

    Ok(session_id)
}

/// Spans shared by the CLI commands
pub mod spans {
    use tracing::{info_span, Span};

    /// One whole driver run
    pub fn run(session_id: &str, job: &str, model: &str) -> Span {
        info_span!("run", session_id = %session_id, job = %job, model = %model)
    }

    /// One storage-side maintenance command
    pub fn maintenance(command: &str, target: &str) -> Span {
        info_span!("maintenance", command = %command, target = %target)
    }
}

pub mod events {
    use tracing::error;

    /// Final error of a CLI command, with its source chain flattened
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        error!(
            error = %error,
            causes = %chain.join(": "),
            context = %context,
            "❌ Command failed"
        );
    }
}
