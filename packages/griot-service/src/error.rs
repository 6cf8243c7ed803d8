pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("{service} unavailable: {message}")]
	Upstream { service: String, message: String },
	#[error("In-flight lock contention on {key_prefix}.")]
	LockContention { key_prefix: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl Error {
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Upstream { .. } | Self::LockContention { .. })
	}

	pub fn upstream(service: &str, err: impl std::fmt::Display) -> Self {
		Self::Upstream { service: service.to_string(), message: err.to_string() }
	}

	pub(crate) fn stage_failure(&self) -> StageFailure {
		match self {
			Self::Upstream { service, message } => StageFailure {
				service: service.clone(),
				message: message.clone(),
				retryable: true,
			},
			other => StageFailure {
				service: "pipeline".to_string(),
				message: other.to_string(),
				retryable: other.is_retryable(),
			},
		}
	}
}

impl From<griot_store::Error> for Error {
	fn from(err: griot_store::Error) -> Self {
		match err {
			griot_store::Error::Redis { message } => {
				Self::Upstream { service: "kv-store".to_string(), message }
			},
			griot_store::Error::Qdrant { message } => {
				Self::Upstream { service: "vector-store".to_string(), message }
			},
			griot_store::Error::InvalidPayload { message } => Self::Internal { message },
		}
	}
}

/// The failure a leader broadcasts to its followers. Every follower of a
/// failed flight receives this same failure; none retries the work on the
/// leader's behalf.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StageFailure {
	pub service: String,
	pub message: String,
	pub retryable: bool,
}

impl From<StageFailure> for Error {
	fn from(failure: StageFailure) -> Self {
		if failure.retryable {
			Self::Upstream { service: failure.service, message: failure.message }
		} else {
			Self::Internal { message: failure.message }
		}
	}
}
