use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging to stderr.
///
/// The level applies to this crate; the engine logs at `warn` unless
/// `RUST_LOG` says otherwise. Worker threads are named, so records carry the
/// thread name of the rank that emitted them.
pub fn init_logging(level: &str) -> color_eyre::Result<()> {
    let default_filter = format!("paramsweep={level},paramsweep_core=warn");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()?;

    tracing::debug!(filter = %default_filter, "Logging initialized");
    Ok(())
}
