use std::{collections::BTreeMap, convert::Infallible};

use axum::{
	Json, Router,
	body::{Body, Bytes},
	extract::State,
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use griot_domain::{Answer, AnswerMode, DocumentInfo, InvalidationEvent, Query};
use griot_service::{Error as ServiceError, EvictionReport};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/answers", post(answer))
		.route("/v1/answers/stream", post(answer_stream))
		.route("/v1/documents", get(list_documents))
		.route("/v1/documents/changed", post(document_changed))
		.with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
	pub query: String,
	#[serde(default)]
	pub mode: AnswerMode,
	#[serde(default)]
	pub filters: BTreeMap<String, String>,
}
impl From<AskRequest> for Query {
	fn from(request: AskRequest) -> Self {
		Self { text: request.query, mode: request.mode, filters: request.filters }
	}
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
	pub documents: Vec<DocumentInfo>,
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn answer(
	State(state): State<AppState>,
	Json(payload): Json<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
	let response = state.service.answer(payload.into()).await?;
	Ok(Json(response))
}

async fn answer_stream(
	State(state): State<AppState>,
	Json(payload): Json<AskRequest>,
) -> Response {
	let events = state.service.answer_stream(payload.into());
	let body = Body::from_stream(events.map(|event| -> Result<Bytes, Infallible> {
		let line = match event {
			Ok(event) => match serde_json::to_string(&event) {
				Ok(line) => line,
				Err(err) => error_line("encoding_failed", &err.to_string()),
			},
			Err(err) => error_line(error_code(&err), &err.to_string()),
		};

		Ok(Bytes::from(format!("{line}\n")))
	}));

	([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

async fn list_documents(
	State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, ApiError> {
	let documents = state.service.list_documents().await?;
	Ok(Json(DocumentListResponse { documents }))
}

async fn document_changed(
	State(state): State<AppState>,
	Json(event): Json<InvalidationEvent>,
) -> Result<Json<EvictionReport>, ApiError> {
	let report = state.service.invalidation_bus().on_document_changed(&event).await;
	Ok(Json(report))
}

fn error_line(code: &str, message: &str) -> String {
	serde_json::json!({
		"event": "error",
		"data": { "error_code": code, "message": message },
	})
	.to_string()
}

fn error_code(err: &ServiceError) -> &'static str {
	match err {
		ServiceError::InvalidRequest { .. } => "invalid_request",
		ServiceError::Upstream { .. } => "upstream_unavailable",
		ServiceError::LockContention { .. } => "lock_contention",
		ServiceError::Internal { .. } => "internal",
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let status = match &err {
			ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
			ServiceError::Upstream { .. } => StatusCode::BAD_GATEWAY,
			ServiceError::LockContention { .. } => StatusCode::SERVICE_UNAVAILABLE,
			ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		};

		Self { status, error_code: error_code(&err).to_string(), message: err.to_string() }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
