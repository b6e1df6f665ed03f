use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "gateway.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    std::env::var("GATEWAY_OBSERVABILITY_ENABLED")
        .ok()
        .and_then(|value| parse_bool_env(&value))
        .unwrap_or(true)
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("GATEWAY_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn split_log_path(path: &std::path::Path) -> (&std::path::Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Installs the process-wide `tracing` subscriber once.
///
/// Environment variables:
/// - `GATEWAY_OBSERVABILITY_ENABLED`: set to `false` to skip installation.
/// - `GATEWAY_LOG_LEVEL`: filter override (`info`, `gateway_core=debug`, ...), then `RUST_LOG`.
/// - `GATEWAY_JSON_LOG_PATH`: write JSON lines to this file instead of compact stdout output.
///
/// Safe to call from several entry points; later calls are no-ops.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter();
        if let Ok(path_raw) = std::env::var("GATEWAY_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            let (dir, file_name) = split_log_path(&path);
            let _ = std::fs::create_dir_all(dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stdout);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
