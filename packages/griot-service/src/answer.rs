use std::{collections::BTreeMap, future::Future};

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use griot_domain::{
	Answer, AnswerEvent, AnswerMode, ContextPack, NormalizedQuery, Query, RetrievalSet, compress,
	normalize_query,
};

use crate::{
	CacheBucket, Error, Flight, FlightOutcome, GriotService, Result, StageFailure, generate, keys,
	prompts,
};

impl GriotService {
	/// Runs the four-stage pipeline for one query and returns a well-formed
	/// answer or a typed failure — never a partial payload. Zero grounding
	/// and an exhausted context budget are valid answers, not errors.
	pub async fn answer(&self, query: Query) -> Result<Answer> {
		let model = self.cfg.providers.generation.model.clone();
		let normalized = normalize_query(&query.text);

		if normalized.is_empty() {
			return Ok(generate::refusal_answer(
				generate::REFUSAL_EMPTY_QUERY,
				query.mode,
				&model,
			));
		}

		let rewritten = self.rewrite_stage(&normalized).await?;
		let retrieval = self.retrieval_stage(&rewritten, &query.filters).await?;

		if retrieval.is_empty() {
			return Ok(match query.mode {
				AnswerMode::Answer => generate::refusal_answer(
					generate::REFUSAL_NO_GROUNDING,
					AnswerMode::Answer,
					&model,
				),
				AnswerMode::Verbatim => generate::not_found_answer(&model),
			});
		}

		let pack = self.compress_stage(&rewritten, &retrieval).await?;

		if pack.is_empty() {
			return Ok(if pack.truncated {
				generate::budget_exceeded_answer(query.mode, &model)
			} else {
				generate::refusal_answer(generate::REFUSAL_NO_GROUNDING, query.mode, &model)
			});
		}

		self.generate_stage(&query.text, &rewritten, &retrieval, &pack, query.mode).await
	}

	/// Streaming variant: the same staged pipeline, but generation deltas are
	/// yielded as they arrive. Cache hits, verbatim answers, and follower
	/// slots resolve to a single terminal `Complete` event. The stream is
	/// finite and not restartable.
	pub fn answer_stream(
		&self,
		query: Query,
	) -> impl Stream<Item = Result<AnswerEvent>> + Send + use<> {
		let svc = self.clone();

		try_stream! {
			let model = svc.cfg.providers.generation.model.clone();
			let normalized = normalize_query(&query.text);

			if normalized.is_empty() {
				yield AnswerEvent::Complete(generate::refusal_answer(
					generate::REFUSAL_EMPTY_QUERY,
					query.mode,
					&model,
				));

				return;
			}

			let rewritten = svc.rewrite_stage(&normalized).await?;
			let retrieval = svc.retrieval_stage(&rewritten, &query.filters).await?;

			if retrieval.is_empty() {
				yield AnswerEvent::Complete(match query.mode {
					AnswerMode::Answer => generate::refusal_answer(
						generate::REFUSAL_NO_GROUNDING,
						AnswerMode::Answer,
						&model,
					),
					AnswerMode::Verbatim => generate::not_found_answer(&model),
				});

				return;
			}

			let pack = svc.compress_stage(&rewritten, &retrieval).await?;

			if pack.is_empty() {
				yield AnswerEvent::Complete(if pack.truncated {
					generate::budget_exceeded_answer(query.mode, &model)
				} else {
					generate::refusal_answer(generate::REFUSAL_NO_GROUNDING, query.mode, &model)
				});

				return;
			}
			if query.mode == AnswerMode::Verbatim {
				let answer = svc
					.generate_stage(&query.text, &rewritten, &retrieval, &pack, query.mode)
					.await?;

				yield AnswerEvent::Complete(answer);

				return;
			}

			let key = build_stage_key(
				keys::build_answer_key(&rewritten, &model, AnswerMode::Answer),
				CacheBucket::Answer,
			);

			if let Some(key) = &key
				&& let Some(answer) = svc.cache.get::<Answer>(CacheBucket::Answer, key).await
			{
				yield AnswerEvent::Complete(answer);

				return;
			}

			// A streaming leader cannot hand its work to a detached task:
			// deltas must flow to this caller. Dropping the stream mid-flight
			// fails followers over to a fresh election instead of hanging.
			let guard = match key.as_ref() {
				Some(key) => match svc.flights.join(key).await {
					Flight::Leader(guard) => Some(guard),
					Flight::Follower(rx) => {
						match svc.flights.await_outcome(rx).await {
							Some(FlightOutcome::Ok(value)) => {
								let answer: Answer = keys::decode_json(value, "answer")?;

								yield AnswerEvent::Complete(answer);

								return;
							},
							Some(FlightOutcome::Failed(failure)) => {
								Err::<(), Error>(failure.into())?;

								return;
							},
							None => None,
						}
					},
					Flight::Remote | Flight::Bypass => None,
				},
				None => None,
			};
			let cfg = &svc.cfg.providers.generation;
			let mut deltas = svc
				.providers
				.chat
				.stream(cfg, prompts::SYSTEM_PROMPT, &prompts::answer_prompt(&query.text, &pack))
				.await
				.map_err(|err| Error::upstream("generation", err))?;
			let started = std::time::Instant::now();
			let mut text = String::new();

			while let Some(delta) = deltas.next().await {
				let delta = delta.map_err(|err| Error::upstream("generation", err))?;

				text.push_str(&delta);

				yield AnswerEvent::Delta(delta);
			}

			let answer = generate::grounded_answer(
				text,
				&pack,
				&retrieval,
				AnswerMode::Answer,
				&model,
				Default::default(),
				started.elapsed().as_millis() as u64,
			);

			if let Some(key) = &key {
				svc.cache.put(CacheBucket::Answer, key, &answer, &answer_citations(&answer)).await;
			}
			if let Some(guard) = guard {
				match serde_json::to_value(&answer) {
					Ok(value) => guard.publish(FlightOutcome::Ok(value)).await,
					Err(err) => {
						guard
							.publish(FlightOutcome::Failed(StageFailure {
								service: "pipeline".to_string(),
								message: err.to_string(),
								retryable: false,
							}))
							.await;
					},
				}
			}

			yield AnswerEvent::Complete(answer);
		}
	}

	async fn rewrite_stage(&self, normalized: &NormalizedQuery) -> Result<String> {
		let key = build_stage_key(
			keys::build_rewrite_key(normalized, &self.cfg.providers.rewrite),
			CacheBucket::Rewrite,
		);
		let svc = self.clone();
		let normalized = normalized.clone();

		self.run_stage(CacheBucket::Rewrite, key, no_stage_citations, move || {
			let svc = svc.clone();
			let normalized = normalized.clone();

			async move { svc.rewrite_query(&normalized).await }
		})
		.await
	}

	async fn retrieval_stage(
		&self,
		rewritten: &str,
		filters: &BTreeMap<String, String>,
	) -> Result<RetrievalSet> {
		let key = build_stage_key(
			keys::build_retrieval_key(
				rewritten,
				filters,
				self.cfg.pipeline.top_k,
				&self.cfg.providers.embedding,
			),
			CacheBucket::Retrieval,
		);
		let svc = self.clone();
		let rewritten = rewritten.to_string();
		let filters = filters.clone();

		self.run_stage(CacheBucket::Retrieval, key, retrieval_citations, move || {
			let svc = svc.clone();
			let rewritten = rewritten.clone();
			let filters = filters.clone();

			async move { svc.retrieve_chunks(&rewritten, &filters).await }
		})
		.await
	}

	async fn compress_stage(
		&self,
		rewritten: &str,
		retrieval: &RetrievalSet,
	) -> Result<ContextPack> {
		let budget = self.cfg.pipeline.max_context_budget;
		let key = build_stage_key(
			keys::build_compress_key(rewritten, &retrieval.chunk_ids(), budget),
			CacheBucket::Compression,
		);
		let retrieval = retrieval.clone();

		self.run_stage(CacheBucket::Compression, key, pack_citations, move || {
			let retrieval = retrieval.clone();

			async move { Ok(compress(&retrieval, budget)) }
		})
		.await
	}

	async fn generate_stage(
		&self,
		question: &str,
		rewritten: &str,
		retrieval: &RetrievalSet,
		pack: &ContextPack,
		mode: AnswerMode,
	) -> Result<Answer> {
		let model = self.cfg.providers.generation.model.clone();
		let key = build_stage_key(
			keys::build_answer_key(rewritten, &model, mode),
			CacheBucket::Answer,
		);
		let svc = self.clone();
		let question = question.to_string();
		let retrieval = retrieval.clone();
		let pack = pack.clone();

		self.run_stage(CacheBucket::Answer, key, answer_citations, move || {
			let svc = svc.clone();
			let question = question.clone();
			let retrieval = retrieval.clone();
			let pack = pack.clone();
			let model = model.clone();

			async move {
				match mode {
					AnswerMode::Answer =>
						svc.complete_answer(&question, &pack, &retrieval).await,
					AnswerMode::Verbatim =>
						Ok(generate::verbatim_answer(&pack, &retrieval, &model)),
				}
			}
		})
		.await
	}

	/// The per-stage protocol: cache read, then leader election, then the
	/// real work on a detached task so a cancelled caller never aborts a
	/// computation that followers depend on. Followers reuse the leader's
	/// result or its failure; a lapsed lease re-elects up to the configured
	/// ceiling. Without a key (derivation failed) or a lock store (bypass),
	/// the stage degrades to plain computation.
	pub(crate) async fn run_stage<T, F, Fut>(
		&self,
		bucket: CacheBucket,
		key: Option<String>,
		cited: fn(&T) -> Vec<Uuid>,
		work: F,
	) -> Result<T>
	where
		T: Serialize + DeserializeOwned + Send + Sync + 'static,
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T>> + Send + 'static,
	{
		let Some(key) = key else {
			return work().await;
		};

		for _ in 0..=self.cfg.pipeline.lease_retry_limit {
			if let Some(value) = self.cache.get::<T>(bucket, &key).await {
				return Ok(value);
			}

			match self.flights.join(&key).await {
				Flight::Leader(guard) => {
					let cache = self.cache.clone();
					let task_key = key.clone();
					let fut = work();
					let handle = tokio::spawn(async move {
						let outcome = fut.await;

						match &outcome {
							Ok(value) => {
								cache.put(bucket, &task_key, value, &cited(value)).await;

								match serde_json::to_value(value) {
									Ok(json) => guard.publish(FlightOutcome::Ok(json)).await,
									Err(err) => {
										guard
											.publish(FlightOutcome::Failed(StageFailure {
												service: "pipeline".to_string(),
												message: err.to_string(),
												retryable: false,
											}))
											.await;
									},
								}
							},
							Err(err) => {
								guard.publish(FlightOutcome::Failed(err.stage_failure())).await;
							},
						}

						outcome
					});

					return match handle.await {
						Ok(outcome) => outcome,
						Err(err) => {
							Err(Error::Internal { message: format!("Stage task failed: {err}") })
						},
					};
				},
				Flight::Follower(rx) => match self.flights.await_outcome(rx).await {
					Some(FlightOutcome::Ok(value)) => {
						return keys::decode_json(value, bucket.as_str());
					},
					Some(FlightOutcome::Failed(failure)) => return Err(Error::from(failure)),
					None => {
						tracing::warn!(
							cache_kind = bucket.as_str(),
							cache_key_prefix = keys::cache_key_prefix(&key),
							"Leader lease expired without an outcome; re-electing."
						);

						continue;
					},
				},
				Flight::Remote => {
					self.flights.wait_remote(&key).await;

					continue;
				},
				Flight::Bypass => {
					let value = work().await?;

					self.cache.put(bucket, &key, &value, &cited(&value)).await;

					return Ok(value);
				},
			}
		}

		Err(Error::LockContention { key_prefix: keys::cache_key_prefix(&key).to_string() })
	}
}

fn build_stage_key(result: Result<String>, bucket: CacheBucket) -> Option<String> {
	match result {
		Ok(key) => Some(key),
		Err(err) => {
			tracing::warn!(
				error = %err,
				cache_kind = bucket.as_str(),
				"Cache key build failed; running stage uncached."
			);

			None
		},
	}
}

pub(crate) fn no_stage_citations<T>(_: &T) -> Vec<Uuid> {
	Vec::new()
}

fn retrieval_citations(set: &RetrievalSet) -> Vec<Uuid> {
	set.chunk_ids()
}

fn pack_citations(pack: &ContextPack) -> Vec<Uuid> {
	pack.cited_chunk_ids()
}

fn answer_citations(answer: &Answer) -> Vec<Uuid> {
	let mut seen = Vec::new();

	for source in &answer.sources {
		if !seen.contains(&source.chunk_id) {
			seen.push(source.chunk_id);
		}
	}

	seen
}
