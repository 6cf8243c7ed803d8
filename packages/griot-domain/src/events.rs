use time::OffsetDateTime;
use uuid::Uuid;

/// Emitted by the document ingestion subsystem when a document is added,
/// updated, or removed. `chunk_ids` is the affected chunk set under the
/// ingestion subsystem's chunk-to-document mapping.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InvalidationEvent {
	pub document_id: Uuid,
	pub chunk_ids: Vec<Uuid>,
	#[serde(with = "time::serde::rfc3339")]
	pub occurred_at: OffsetDateTime,
}
