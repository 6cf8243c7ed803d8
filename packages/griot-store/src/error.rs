pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Redis error: {message}")]
	Redis { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Invalid payload: {message}")]
	InvalidPayload { message: String },
}

impl From<redis::RedisError> for Error {
	fn from(err: redis::RedisError) -> Self {
		Self::Redis { message: err.to_string() }
	}
}

impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant { message: err.to_string() }
	}
}
