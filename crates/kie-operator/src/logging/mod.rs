use std::{
    error::Error as StdError,
    fmt::Write as _,
    io::{Sink, sink},
    path::PathBuf,
};

use snafu::{ResultExt, Snafu};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, Registry,
    filter::ParseError,
    fmt::{
        MakeWriter,
        writer::{EitherWriter, MakeWriterExt as _},
    },
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

pub mod controller;
mod k8s_events;

/// Variable holding the log filter of the operator binary.
pub const LOG_ENV: &str = "KIE_OPERATOR_LOG";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse the default log filter"))]
    DefaultFilter { source: ParseError },

    #[snafu(display("failed to initialize the rolling log file in {}", directory.display()))]
    RollingFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("failed to install the global tracing subscriber"))]
    InstallSubscriber { source: TryInitError },
}

/// Log line format, selected with `{env}_FORMAT`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl LogFormat {
    /// `json` (in any case) selects JSON lines, anything else plain text.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Plain,
        }
    }
}

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter, such as [`LOG_ENV`].
///
/// If the variable is not set, the maximum log level is INFO.
///
/// Log output can be copied to a file by setting `{env}_DIRECTORY` to a directory path. The
/// file is rotated hourly and the last six files are kept. `{env}_FORMAT=json` switches both
/// outputs to JSON lines.
pub fn initialize_logging(env: &str, app_name: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_env(env) {
        Ok(env_filter) => env_filter,
        _ => EnvFilter::try_new(tracing::Level::INFO.to_string()).context(DefaultFilterSnafu)?,
    };

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_appender = file_appender_directory
        .as_deref()
        .map(|log_dir| {
            RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_suffix(format!("{app_name}.log"))
                .max_log_files(6)
                .build(log_dir)
                .context(RollingFileAppenderSnafu { directory: log_dir })
        })
        .transpose()?;
    let writer = std::io::stdout.and(OptionalMakeWriter::from(file_appender));

    let format = LogFormat::from_value(std::env::var(format!("{env}_FORMAT")).ok().as_deref());
    let fmt = match format {
        LogFormat::Plain => tracing_subscriber::fmt::layer().with_writer(writer).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
    };
    Registry::default()
        .with(filter)
        .with(fmt)
        .try_init()
        .context(InstallSubscriberSnafu)?;

    // need to delay logging until after tracing is initialized
    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }
    Ok(())
}

/// Renders `error` followed by every error in its source chain.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(error) = source {
        // writing into a String cannot fail
        let _ = write!(message, ": {error}");
        source = error.source();
    }
    message
}

/// Like [`EitherWriter`] but implements [`MakeWriter`] instead of [`std::io::Write`].
/// For selecting writers depending on dynamic configuration.
enum EitherMakeWriter<A, B> {
    A(A),
    B(B),
}

impl<'a, A, B> MakeWriter<'a> for EitherMakeWriter<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = EitherWriter<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        match self {
            Self::A(a) => EitherWriter::A(a.make_writer()),
            Self::B(b) => EitherWriter::B(b.make_writer()),
        }
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        match self {
            Self::A(a) => EitherWriter::A(a.make_writer_for(meta)),
            Self::B(b) => EitherWriter::B(b.make_writer_for(meta)),
        }
    }
}

type OptionalMakeWriter<T> = EitherMakeWriter<T, fn() -> Sink>;

impl<T> From<Option<T>> for OptionalMakeWriter<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(t) => Self::A(t),
            None => Self::B(sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing::{debug, error, info};

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("failed to apply Route \"app-rhpamcentr\""))]
    struct ApplyError {
        source: std::io::Error,
    }

    // Run with `KIE_LOG_TEST_UNSET=debug cargo test default_tracing -- --nocapture` to
    // see every message.
    #[test]
    fn default_tracing_level_is_info() {
        initialize_logging("KIE_LOG_TEST_UNSET", "test").expect("logging is initialized once");

        error!("ERROR level messages should be seen.");
        info!("INFO level messages should also be seen by default.");
        debug!("DEBUG level messages should be seen only if you set the env var.");
    }

    #[rstest]
    #[case(Some("json"), LogFormat::Json)]
    #[case(Some("JSON"), LogFormat::Json)]
    #[case(Some("plain"), LogFormat::Plain)]
    #[case(None, LogFormat::Plain)]
    fn log_format_from_value(#[case] value: Option<&str>, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::from_value(value), expected);
    }

    #[test]
    fn error_chain_joins_sources() {
        let error = ApplyError {
            source: std::io::Error::other("route host is already taken"),
        };
        assert_eq!(
            error_chain(&error),
            "failed to apply Route \"app-rhpamcentr\": route host is already taken"
        );
    }
}
