use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Keep a guard for non-blocking console to avoid being dropped.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const DEFAULT_MAX_SIZE_MB: u64 = 100;

fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" | "" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// Returns true if target == prefix or target starts with "prefix::"
fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ================= rotating file sinks =================

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct FileSink(SharedRotate);

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut f) => f.write(buf),
            Err(poisoned) => poisoned.into_inner().write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut f) => f.flush(),
            Err(poisoned) => poisoned.into_inner().flush(),
        }
    }
}

/// Writer that drops records nobody routed to a file.
struct MaybeSink(Option<FileSink>);

impl Write for MaybeSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes records to per-subsystem files by target prefix, with a default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<FileSink>,
    by_prefix: Vec<(String, FileSink)>,
}

impl FileRouter {
    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }

    fn resolve(&self, target: &str) -> Option<FileSink> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| matches_target_prefix(target, prefix))
            .map(|(_, sink)| sink.clone())
            .or_else(|| self.default.clone())
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = MaybeSink;

    fn make_writer(&'a self) -> Self::Writer {
        MaybeSink(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        MaybeSink(self.resolve(meta.target()))
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

// Oversized limits clamp to usize::MAX instead of wrapping.
fn rotation_bytes(max_size_mb: Option<u64>) -> usize {
    let mb = usize::try_from(max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB)).unwrap_or(usize::MAX);
    mb.saturating_mul(1024 * 1024)
}

fn open_file_sink(section: &Section, base_dir: &Path) -> std::io::Result<Option<FileSink>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }

    let path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Prefer a file count when given, otherwise an age window.
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = rotation_bytes(section.max_size_mb);

    let rotate = FileRotate::new(
        path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(Some(FileSink(Arc::new(Mutex::new(rotate)))))
}

// ================= filters =================

fn console_targets(cfg: &LoggingConfig) -> Targets {
    let default = cfg
        .get("default")
        .and_then(|s| parse_level(&s.console_level))
        .unwrap_or(LevelFilter::INFO);

    cfg.iter()
        .filter(|(name, _)| name.as_str() != "default")
        .filter_map(|(name, s)| parse_level(&s.console_level).map(|lvl| (name.clone(), lvl)))
        .fold(Targets::new().with_default(default), |t, (name, lvl)| {
            t.with_target(name, lvl)
        })
}

fn file_targets(cfg: &LoggingConfig, has_default_file: bool) -> Targets {
    let fallback = if has_default_file {
        LevelFilter::INFO
    } else {
        LevelFilter::OFF
    };
    let default = cfg
        .get("default")
        .filter(|_| has_default_file)
        .and_then(|s| parse_level(&s.file_level))
        .unwrap_or(fallback);

    cfg.iter()
        .filter(|(name, s)| name.as_str() != "default" && !s.file.trim().is_empty())
        .filter_map(|(name, s)| parse_level(&s.file_level).map(|lvl| (name.clone(), lvl)))
        .fold(Targets::new().with_default(default), |t, (name, lvl)| {
            t.with_target(name, lvl)
        })
}

fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    let mut router = FileRouter::default();

    for (name, section) in cfg {
        match open_file_sink(section, base_dir) {
            Ok(Some(sink)) if name == "default" => router.default = Some(sink),
            Ok(Some(sink)) => router.by_prefix.push((name.clone(), sink)),
            Ok(None) => {}
            Err(e) => eprintln!(
                "Failed to init log file for subsystem '{}': {} ({})",
                name, section.file, e
            ),
        }
    }

    // Longest prefix first so "app::db" wins over "app".
    router
        .by_prefix
        .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    router
}

// ================= public init =================

/// Install the global subscriber: console (stderr, non-blocking) plus optional
/// JSON files routed by target prefix. `RUST_LOG`, when set, caps both sinks.
///
/// Relative log file paths resolve against `base_dir`. Calling this more than
/// once keeps the first subscriber.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` *before* installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let env: Option<EnvFilter> = EnvFilter::try_from_default_env().ok();

    let router = build_file_router(cfg, base_dir);
    let file_filter = file_targets(cfg, router.default.is_some());

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets(cfg));

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_filter)
    });

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
