use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use griot_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_with<F>(mutate: F) -> String
where
	F: FnOnce(&mut toml::map::Map<String, Value>),
{
	let mut value: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let root = value.as_table_mut().expect("Sample config must be a table.");

	mutate(root);

	toml::to_string(&value).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("griot_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load(payload: String) -> Result<Config, Error> {
	let path = write_temp_config(payload);
	let result = griot_config::load(&path);

	let _ = fs::remove_file(&path);

	result
}

#[test]
fn loads_sample_config() {
	let cfg = load(SAMPLE_CONFIG_TOML.to_string()).expect("Sample config must load.");

	assert_eq!(cfg.pipeline.top_k, 8);
	assert_eq!(cfg.cache.answer_ttl_secs, 900);
	assert_eq!(cfg.storage.qdrant.vector_dim, 1536);
}

#[test]
fn normalizes_empty_llm_path() {
	let cfg = load(SAMPLE_CONFIG_TOML.to_string()).expect("Sample config must load.");

	assert_eq!(cfg.providers.rewrite.path, "/v1/chat/completions");
}

#[test]
fn accepts_zero_ttls_as_disabled_buckets() {
	let payload = sample_with(|root| {
		let cache = root
			.get_mut("cache")
			.and_then(Value::as_table_mut)
			.expect("Sample config must include [cache].");

		for key in [
			"rewrite_ttl_secs",
			"retrieval_ttl_secs",
			"compress_ttl_secs",
			"answer_ttl_secs",
			"file_listing_ttl_secs",
		] {
			cache.insert(key.to_string(), Value::Integer(0));
		}
	});

	load(payload).expect("All-zero TTLs must validate.");
}

#[test]
fn rejects_negative_ttl() {
	let payload = sample_with(|root| {
		let cache = root
			.get_mut("cache")
			.and_then(Value::as_table_mut)
			.expect("Sample config must include [cache].");

		cache.insert("answer_ttl_secs".to_string(), Value::Integer(-1));
	});

	assert!(matches!(load(payload), Err(Error::Validation { .. })));
}

#[test]
fn rejects_dimension_mismatch() {
	let payload = sample_with(|root| {
		let qdrant = root
			.get_mut("storage")
			.and_then(Value::as_table_mut)
			.and_then(|storage| storage.get_mut("qdrant"))
			.and_then(Value::as_table_mut)
			.expect("Sample config must include [storage.qdrant].");

		qdrant.insert("vector_dim".to_string(), Value::Integer(768));
	});

	assert!(matches!(load(payload), Err(Error::Validation { .. })));
}

#[test]
fn rejects_zero_lock_lease() {
	let payload = sample_with(|root| {
		let pipeline = root
			.get_mut("pipeline")
			.and_then(Value::as_table_mut)
			.expect("Sample config must include [pipeline].");

		pipeline.insert("lock_lease_ms".to_string(), Value::Integer(0));
	});

	assert!(matches!(load(payload), Err(Error::Validation { .. })));
}

#[test]
fn rejects_empty_api_key() {
	let payload = sample_with(|root| {
		let embedding = root
			.get_mut("providers")
			.and_then(Value::as_table_mut)
			.and_then(|providers| providers.get_mut("embedding"))
			.and_then(Value::as_table_mut)
			.expect("Sample config must include [providers.embedding].");

		embedding.insert("api_key".to_string(), Value::String(" ".to_string()));
	});

	assert!(matches!(load(payload), Err(Error::Validation { .. })));
}
