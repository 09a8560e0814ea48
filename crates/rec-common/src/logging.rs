use std::any::Any;
use std::panic::{self, Location};
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub const LOG_DIR_ENV: &str = "REC_LOG_DIR";
pub const LOG_BACKTRACE_ENV: &str = "REC_LOG_INCLUDE_BACKTRACE";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Log sink and panic-hook behaviour, read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// Daily-rotated `<dir>/<app>.log` instead of stdout.
    pub dir: Option<PathBuf>,
    /// Also run the default panic hook (prints the backtrace to stderr).
    pub chain_default_hook: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            dir: lookup(LOG_DIR_ENV).filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            chain_default_hook: lookup(LOG_BACKTRACE_ENV).is_some_and(|v| truthy(&v)),
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Text of a panic payload; `&str` and `String` payloads are the common case.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

fn log_panic(app_name: &str, location: Option<&Location<'_>>, payload: &(dyn Any + Send)) {
    let location = location
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".into());
    tracing::error!(
        application = app_name,
        run_id = crate::run_id::get(),
        thread = std::thread::current().name().unwrap_or("unnamed"),
        %location,
        panic_message = %panic_message(payload),
        "panic captured"
    );
}

/// Panics go to the tracing sink with the process run id attached. Only the
/// first call installs the hook.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let chain = LogSettings::from_env().chain_default_hook;
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            log_panic(app_name, info.location(), info.payload());
            if chain {
                default_hook(info);
            }
        }));
    });
}

fn file_writer(dir: PathBuf, app_name: &str) -> Option<BoxMakeWriter> {
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!("{app_name}: cannot create log dir {}: {err}; logging to stdout", dir.display());
        return None;
    }
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, format!("{app_name}.log")));
    let _ = LOG_GUARD.set(guard);
    Some(BoxMakeWriter::new(writer))
}

/// `RUST_LOG` filters (default `info`). Repeated calls are no-ops.
pub fn init_tracing_subscriber(app_name: &'static str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match LogSettings::from_env().dir.and_then(|dir| file_writer(dir, app_name)) {
        Some(writer) => {
            let _ = builder.with_ansi(false).with_writer(writer).try_init();
        }
        None => {
            let _ = builder.try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> LogSettings {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        LogSettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn settings_default_to_stdout_without_chaining() {
        assert_eq!(settings(&[]), LogSettings::default());
        assert_eq!(settings(&[(LOG_DIR_ENV, "  ")]).dir, None);
    }

    #[test]
    fn settings_read_dir_and_backtrace_flag() {
        let s = settings(&[(LOG_DIR_ENV, "/var/log/rec"), (LOG_BACKTRACE_ENV, " Yes ")]);
        assert_eq!(s.dir, Some(PathBuf::from("/var/log/rec")));
        assert!(s.chain_default_hook);
        assert!(!settings(&[(LOG_BACKTRACE_ENV, "0")]).chain_default_hook);
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let caught = panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 7");
        let caught = panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "non-string panic payload");
    }
}
