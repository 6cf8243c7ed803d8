use std::{collections::BTreeMap, sync::Arc};

use time::OffsetDateTime;
use uuid::Uuid;

use griot_domain::{AnswerMode, DocumentInfo, InvalidationEvent, Query};
use griot_testkit::{
	FixtureIndex, ScriptedChat, StaticCatalog, corpus_chunk, corpus_chunk_with_metadata,
	test_config, test_service, test_service_with_catalog,
};

const TERSE_QUERY: &str = "voicemail pin";
const VOICEMAIL_CHUNK: &str = "Dial *86 then follow the prompts";

fn query(text: &str) -> Query {
	Query { text: text.to_string(), mode: AnswerMode::Answer, filters: BTreeMap::new() }
}

#[tokio::test]
async fn document_change_evicts_downstream_buckets_but_not_rewrites() {
	let fixture = corpus_chunk("voicemail.md", VOICEMAIL_CHUNK, 0.93);
	let document_id = fixture.chunk.document_id;
	let chunk_id = fixture.chunk.chunk_id;
	let chat = Arc::new(ScriptedChat::new("Dial *86 and follow the prompts."));
	let svc = test_service(test_config(), chat.clone(), FixtureIndex::new(vec![fixture]));

	// A terse query goes through the rewrite model once, then both the
	// rewrite and the answer are served from cache.
	let first = svc.answer(query(TERSE_QUERY)).await.expect("answer failed");

	assert_eq!(chat.rewrite_calls(), 1);
	assert_eq!(chat.generation_calls(), 1);

	let second = svc.answer(query(TERSE_QUERY)).await.expect("answer failed");

	assert_eq!(second, first);
	assert_eq!(chat.rewrite_calls(), 1);
	assert_eq!(chat.generation_calls(), 1);

	let report = svc
		.invalidation_bus()
		.on_document_changed(&InvalidationEvent {
			document_id,
			chunk_ids: vec![chunk_id],
			occurred_at: OffsetDateTime::now_utc(),
		})
		.await;

	assert!(report.evicted >= 3, "retrieval, compression, and answer entries must fall");

	// Retrieval, compression, and generation recompute; the rewrite bucket
	// is untouched, so the rewrite model is not called again.
	let third = svc.answer(query(TERSE_QUERY)).await.expect("answer failed");

	assert_eq!(chat.rewrite_calls(), 1);
	assert_eq!(chat.generation_calls(), 2);
	assert_eq!(third.cited_documents(), first.cited_documents());
}

#[tokio::test]
async fn unrelated_documents_keep_their_cached_answers() {
	let voicemail = corpus_chunk_with_metadata(
		"voicemail.md",
		VOICEMAIL_CHUNK,
		0.93,
		&[("topic", "voicemail")],
	);
	let vpn = corpus_chunk_with_metadata(
		"vpn.md",
		"The VPN endpoint is vpn.example.com.",
		0.9,
		&[("topic", "vpn")],
	);
	let vpn_document = vpn.chunk.document_id;
	let vpn_chunk = vpn.chunk.chunk_id;
	let chat = Arc::new(ScriptedChat::new("Grounded reply."));
	let svc = test_service(test_config(), chat.clone(), FixtureIndex::new(vec![voicemail, vpn]));
	let mut voicemail_query = query("How do I reset my voicemail PIN?");

	voicemail_query.filters.insert("topic".to_string(), "voicemail".to_string());

	let _ = svc.answer(voicemail_query.clone()).await.expect("answer failed");

	assert_eq!(chat.generation_calls(), 1);

	// Churn on the VPN document leaves the voicemail answer, which cites no
	// VPN chunk, untouched in the cache.
	svc.invalidation_bus()
		.on_document_changed(&InvalidationEvent {
			document_id: vpn_document,
			chunk_ids: vec![vpn_chunk],
			occurred_at: OffsetDateTime::now_utc(),
		})
		.await;

	let _ = svc.answer(voicemail_query).await.expect("answer failed");

	assert_eq!(chat.generation_calls(), 1);
}

#[tokio::test]
async fn file_listing_is_cached_and_falls_with_document_churn() {
	let catalog = Arc::new(StaticCatalog::new(vec![DocumentInfo {
		document_id: Uuid::new_v4(),
		filename: "voicemail.md".to_string(),
		content_hash: "abc123".to_string(),
		size_bytes: 2_048,
		total_chunks: 3,
		last_ingested_at: None,
	}]));
	let chat = Arc::new(ScriptedChat::new("unused"));
	let svc = test_service_with_catalog(
		test_config(),
		chat,
		FixtureIndex::empty(),
		catalog.clone(),
	);

	let listing = svc.list_documents().await.expect("listing failed");

	assert_eq!(listing.len(), 1);
	assert_eq!(catalog.calls(), 1);

	let _ = svc.list_documents().await.expect("listing failed");

	assert_eq!(catalog.calls(), 1);

	svc.invalidation_bus()
		.on_document_changed(&InvalidationEvent {
			document_id: Uuid::new_v4(),
			chunk_ids: vec![Uuid::new_v4()],
			occurred_at: OffsetDateTime::now_utc(),
		})
		.await;

	let _ = svc.list_documents().await.expect("listing failed");

	assert_eq!(catalog.calls(), 2);
}
