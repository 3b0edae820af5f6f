use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber honouring `RUST_LOG`, `info` when unset.
pub fn default_logging() -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre::eyre!(e))?;

    Ok(())
}
