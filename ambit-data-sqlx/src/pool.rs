use ambit_data::DataError;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::SqlxErrorExt;

/// Open a pool for `config.url`. The driver is picked from the URL scheme
/// among those enabled by cargo features.
pub async fn connect(config: &DatabaseConfig) -> Result<AnyPool, DataError> {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(&config.url)
        .await
        .map_err(|e| e.into_data_error("error connecting to database"))?;
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "database pool ready"
    );
    Ok(pool)
}
