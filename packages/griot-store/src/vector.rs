use std::collections::{BTreeMap, HashMap};

use qdrant_client::{
	Qdrant,
	qdrant::{
		Condition, Filter, Query, QueryPointsBuilder, ScoredPoint, Value, point_id::PointIdOptions,
		value::Kind,
	},
};
use uuid::Uuid;

use griot_domain::RetrievedChunk;

use crate::{BoxFuture, Result};

/// The external vector similarity store. Filters are exact-match metadata
/// predicates with intersection semantics; they narrow the candidate set and
/// never expand it. Implementations return hits in their own relevance
/// order, which callers preserve so that score ties stay reproducible.
pub trait VectorSearch: Send + Sync {
	fn search<'a>(
		&'a self,
		vector: &'a [f32],
		filters: &'a BTreeMap<String, String>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<RetrievedChunk>>>;
}

pub struct QdrantSearch {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantSearch {
	pub fn new(cfg: &griot_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}
}
impl VectorSearch for QdrantSearch {
	fn search<'a>(
		&'a self,
		vector: &'a [f32],
		filters: &'a BTreeMap<String, String>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<RetrievedChunk>>> {
		Box::pin(async move {
			let mut query = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(vector.to_vec()))
				.limit(limit as u64)
				.with_payload(true);

			if !filters.is_empty() {
				let conditions: Vec<Condition> = filters
					.iter()
					.map(|(field, value)| Condition::matches(field.clone(), value.clone()))
					.collect();

				query = query.filter(Filter::must(conditions));
			}

			let response = self.client.query(query).await?;
			let mut chunks = Vec::with_capacity(response.result.len());

			for point in response.result {
				match decode_point(&point) {
					Some(chunk) => chunks.push(chunk),
					None => {
						tracing::warn!(
							collection = %self.collection,
							"Skipping point with malformed chunk payload."
						);
					},
				}
			}

			Ok(chunks)
		})
	}
}

fn decode_point(point: &ScoredPoint) -> Option<RetrievedChunk> {
	let chunk_id = point
		.id
		.as_ref()
		.and_then(|id| id.point_id_options.as_ref())
		.and_then(|options| match options {
			PointIdOptions::Uuid(raw) => Uuid::parse_str(raw).ok(),
			PointIdOptions::Num(_) => None,
		})
		.or_else(|| payload_uuid(&point.payload, "chunk_id"))?;
	let document_id = payload_uuid(&point.payload, "document_id")?;
	let filename = payload_str(&point.payload, "filename")?;
	let text = payload_str(&point.payload, "text")?;

	Some(RetrievedChunk {
		chunk_id,
		document_id,
		filename,
		page: payload_u32(&point.payload, "page"),
		score: point.score,
		start_offset: payload_u32(&point.payload, "start_offset").unwrap_or(0),
		end_offset: payload_u32(&point.payload, "end_offset").unwrap_or(0),
		text,
	})
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::StringValue(value) => Some(value.clone()),
		_ => None,
	}
}

fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	payload_str(payload, key).and_then(|raw| Uuid::parse_str(&raw).ok())
}

fn payload_u32(payload: &HashMap<String, Value>, key: &str) -> Option<u32> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::IntegerValue(value) => u32::try_from(*value).ok(),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn string_value(raw: &str) -> Value {
		Value { kind: Some(Kind::StringValue(raw.to_string())) }
	}

	fn int_value(raw: i64) -> Value {
		Value { kind: Some(Kind::IntegerValue(raw)) }
	}

	fn sample_point() -> ScoredPoint {
		let chunk_id = Uuid::new_v4();
		let document_id = Uuid::new_v4();
		let mut payload = HashMap::new();

		payload.insert("chunk_id".to_string(), string_value(&chunk_id.to_string()));
		payload.insert("document_id".to_string(), string_value(&document_id.to_string()));
		payload.insert("filename".to_string(), string_value("voicemail.md"));
		payload.insert("text".to_string(), string_value("Dial *86 then follow the prompts"));
		payload.insert("start_offset".to_string(), int_value(10));
		payload.insert("end_offset".to_string(), int_value(42));

		ScoredPoint { id: None, payload, score: 0.91, ..Default::default() }
	}

	#[test]
	fn decodes_chunk_payload() {
		let point = sample_point();
		let chunk = decode_point(&point).expect("decode failed");

		assert_eq!(chunk.filename, "voicemail.md");
		assert_eq!(chunk.text, "Dial *86 then follow the prompts");
		assert_eq!(chunk.start_offset, 10);
		assert_eq!(chunk.end_offset, 42);
		assert_eq!(chunk.page, None);
	}

	#[test]
	fn malformed_payload_is_skipped() {
		let mut point = sample_point();

		point.payload.remove("document_id");

		assert!(decode_point(&point).is_none());
	}
}
