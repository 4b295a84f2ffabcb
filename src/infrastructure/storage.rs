use crate::config::ProcessingConfig;
use crate::services::temp_storage::{StorageError, TempStorage};
use std::sync::Arc;
use tracing::info;

/// Creates the temp storage root and clears what a previous process left behind
pub async fn setup_storage(config: &ProcessingConfig) -> Result<Arc<TempStorage>, StorageError> {
    info!("📁 Temp storage: {}", config.temp_dir.display());

    let storage = TempStorage::new(config.temp_dir.clone());
    storage.init().await?;
    Ok(Arc::new(storage))
}
