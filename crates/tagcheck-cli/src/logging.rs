//! Logging setup: console on stderr plus the run's `ci.log`.
//!
//! Both sinks pass through [`Redacting`], which masks storage credentials
//! before anything reaches a terminal or a file that may be published.

use std::borrow::Cow;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tagcheck_common::constants::DEBUG_LOG_FILE;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const MASK: &str = "(removed)";

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. The returned guard flushes
/// `ci.log` when dropped and must be held for the whole run.
///
/// # Errors
///
/// Returns an error if `level` is not a valid filter or a global
/// subscriber is already installed.
pub fn init(level: &str, log_dir: &Path, secrets: Vec<String>) -> anyhow::Result<WorkerGuard> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let file_appender = tracing_appender::rolling::never(log_dir, DEBUG_LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let secrets: Arc<[String]> = secrets.into();

    let console_layer = fmt::layer()
        .with_writer(Redacting::new(io::stderr, Arc::clone(&secrets)))
        .with_target(false)
        .compact();
    let file_layer = fmt::layer()
        .with_writer(Redacting::new(file_writer, secrets))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// Replaces every occurrence of a secret in `text` with `(removed)`.
pub fn redact<'t>(text: &'t str, secrets: &[String]) -> Cow<'t, str> {
    let mut out = Cow::Borrowed(text);
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        if out.contains(secret.as_str()) {
            out = Cow::Owned(out.replace(secret.as_str(), MASK));
        }
    }
    out
}

/// [`MakeWriter`] wrapper masking secrets in every formatted event.
#[derive(Debug, Clone)]
pub struct Redacting<M> {
    inner: M,
    secrets: Arc<[String]>,
}

impl<M> Redacting<M> {
    /// Wraps `inner`, masking `secrets`.
    pub const fn new(inner: M, secrets: Arc<[String]>) -> Self {
        Self { inner, secrets }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for Redacting<M> {
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            secrets: Arc::clone(&self.secrets),
        }
    }
}

/// Writer produced by [`Redacting`]. Each formatted event arrives in a
/// single `write` call.
#[derive(Debug)]
pub struct RedactingWriter<W> {
    inner: W,
    secrets: Arc<[String]>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.secrets.is_empty() {
            return self.inner.write(buf);
        }
        match redact(&String::from_utf8_lossy(buf), &self.secrets) {
            Cow::Borrowed(_) => self.inner.write_all(buf)?,
            Cow::Owned(masked) => self.inner.write_all(masked.as_bytes())?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
