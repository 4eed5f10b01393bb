//! Observability infrastructure for nitrus.
//!
//! Structured logging with consistent spans. This module provides the
//! initialization helper and span constructor used across all nitrus
//! components.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for automation).
    Json,
    /// Pretty-printed logs (for interactive use).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `nitrus_core=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for reconcile operations with standard fields.
///
/// # Example
///
/// ```rust
/// use nitrus_core::observability::reconcile_span;
///
/// let span = reconcile_span("reconcile_all", "furniture", "arcturus");
/// let _guard = span.enter();
/// // ... run the reconciliation
/// ```
#[must_use]
pub fn reconcile_span(operation: &str, adapter: &str, profile: &str) -> Span {
    tracing::info_span!(
        "reconcile",
        op = operation,
        adapter = adapter,
        profile = profile,
    )
}
