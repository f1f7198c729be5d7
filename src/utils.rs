use indicatif::ProgressStyle;

/// Installs a `tracing` subscriber that plays well with the progress bars
/// drawn for task groups. Honors `RUST_LOG`, defaults to `info`.
#[cfg(feature = "logging")]
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .try_init()?;

    Ok(())
}

pub(crate) fn get_style_group() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} [{elapsed}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Runs `f`, turning a panic into an ordinary error. Addons are third-party
/// code, a panic in one of them is reported like any other failure.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("panicked: {s}")
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("panicked: {s}")
            } else {
                String::from("panicked with unknown payload")
            };

            Err(anyhow::anyhow!(msg))
        }
    }
}
