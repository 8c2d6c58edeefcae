use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter for the ETL binary when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "movies_etl=info,sqlite_to_postgres=info,sqlx=warn";

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}
