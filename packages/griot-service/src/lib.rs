pub mod answer;
pub mod cache;
pub mod catalog;
pub mod flight;
pub mod generate;
pub mod invalidate;
pub mod keys;
pub mod prompts;
pub mod retrieve;
pub mod rewrite;

mod error;

pub use cache::{CacheBucket, StageCache};
pub use catalog::{DocumentCatalog, ManifestCatalog};
pub use error::{Error, Result, StageFailure};
pub use flight::{Flight, FlightGuard, FlightOutcome, InFlightCoordinator};
pub use invalidate::{EvictionReport, InvalidationBus};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use futures::Stream;

use griot_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use griot_providers::chat::ChatCompletion;
use griot_store::{KvStore, VectorSearch};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type BoxTextStream = Pin<Box<dyn Stream<Item = color_eyre::Result<String>> + Send>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system: &'a str,
		user: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<ChatCompletion>>;

	fn stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system: &'a str,
		user: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<BoxTextStream>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub chat: Arc<dyn ChatProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, chat: Arc<dyn ChatProvider>) -> Self {
		Self { embedding, chat }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), chat: provider }
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(griot_providers::embedding::embed(cfg, texts))
	}
}

impl ChatProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system: &'a str,
		user: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<ChatCompletion>> {
		Box::pin(griot_providers::chat::complete(cfg, system, user))
	}

	fn stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system: &'a str,
		user: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<BoxTextStream>> {
		Box::pin(griot_providers::chat::stream(cfg, system, user))
	}
}

/// The answer pipeline. Cheap to clone: every field is a shared handle, and
/// stage leaders run on detached tasks that carry their own clone.
#[derive(Clone)]
pub struct GriotService {
	pub cfg: Arc<Config>,
	pub vectors: Arc<dyn VectorSearch>,
	pub catalog: Arc<dyn DocumentCatalog>,
	pub providers: Providers,
	cache: StageCache,
	flights: InFlightCoordinator,
}
impl GriotService {
	pub fn new(
		cfg: Config,
		kv: Arc<dyn KvStore>,
		vectors: Arc<dyn VectorSearch>,
		catalog: Arc<dyn DocumentCatalog>,
	) -> Self {
		Self::with_providers(cfg, kv, vectors, catalog, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		kv: Arc<dyn KvStore>,
		vectors: Arc<dyn VectorSearch>,
		catalog: Arc<dyn DocumentCatalog>,
		providers: Providers,
	) -> Self {
		let cache = StageCache::new(kv.clone(), &cfg.cache);
		let flights =
			InFlightCoordinator::new(kv, Duration::from_millis(cfg.pipeline.lock_lease_ms));

		Self { cfg: Arc::new(cfg), vectors, catalog, providers, cache, flights }
	}

	pub fn invalidation_bus(&self) -> InvalidationBus {
		InvalidationBus::new(self.cache.clone())
	}
}
