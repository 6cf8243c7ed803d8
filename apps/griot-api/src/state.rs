use std::sync::Arc;

use griot_service::{GriotService, ManifestCatalog};
use griot_store::{QdrantSearch, RedisKv};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<GriotService>,
}
impl AppState {
	pub async fn new(config: griot_config::Config) -> color_eyre::Result<Self> {
		let kv = RedisKv::connect(&config.storage.redis.url).await?;
		let vectors = QdrantSearch::new(&config.storage.qdrant)?;
		let catalog = ManifestCatalog::new(&config.corpus);
		let service =
			GriotService::new(config, Arc::new(kv), Arc::new(vectors), Arc::new(catalog));

		Ok(Self { service: Arc::new(service) })
	}
}
