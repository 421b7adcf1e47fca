use once_cell::sync::OnceCell;
use tracing::{span, Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LoggingSettings;

static INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber once. `RUST_LOG` wins over `settings.level`.
pub fn init_tracing(settings: &LoggingSettings) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let (plain, json) = if settings.json {
            (
                None,
                Some(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(true),
                ),
            )
        } else {
            (
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(false)
                        .with_thread_ids(true),
                ),
                None,
            )
        };
        let subscriber = Registry::default().with(filter).with(plain).with(json);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

pub fn run_span(kind: &str, task_id: &str) -> Span {
    span!(Level::INFO, "run", kind = %kind, task_id = %task_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(&LoggingSettings::default());
        init_tracing(&LoggingSettings {
            level: "debug".into(),
            json: true,
        });
        let span = run_span("plan", "task-1");
        span.in_scope(|| tracing::info!("within span"));
    }
}
