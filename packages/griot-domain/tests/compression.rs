use uuid::Uuid;

use griot_domain::{RetrievalSet, RetrievedChunk, compress};

/// Deterministic pseudo-random generator so the property sweep is
/// reproducible without a rand dependency.
struct XorShift(u64);
impl XorShift {
	fn next(&mut self) -> u64 {
		let mut x = self.0;

		x ^= x << 13;
		x ^= x >> 7;
		x ^= x << 17;

		self.0 = x;

		x
	}

	fn below(&mut self, bound: u64) -> u64 {
		self.next() % bound.max(1)
	}
}

const WORDS: [&str; 12] = [
	"server", "restart", "must", "click", "the", "policy", "endpoint", "first", "always", "token",
	"configure", "queue",
];

fn random_sentence(rng: &mut XorShift) -> String {
	let len = 3 + rng.below(9) as usize;
	let mut words = Vec::with_capacity(len);

	for _ in 0..len {
		words.push(WORDS[rng.below(WORDS.len() as u64) as usize]);
	}

	format!("{}.", words.join(" "))
}

fn random_chunk(rng: &mut XorShift) -> RetrievedChunk {
	let sentences = 1 + rng.below(4) as usize;
	let text =
		(0..sentences).map(|_| random_sentence(rng)).collect::<Vec<_>>().join(" ");

	RetrievedChunk {
		chunk_id: Uuid::new_v4(),
		document_id: Uuid::new_v4(),
		filename: format!("doc-{}.md", rng.below(100)),
		page: None,
		score: (rng.below(1_000) as f32) / 1_000.0,
		start_offset: rng.below(10_000) as u32,
		end_offset: 0,
		text,
	}
}

#[test]
fn grounding_invariant_holds_across_randomized_sets() {
	let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);

	for round in 0..50 {
		let count = rng.below(8) as usize;
		let set = RetrievalSet {
			items: (0..count).map(|_| random_chunk(&mut rng)).collect(),
		};
		let budget = 1 + rng.below(120) as u32;
		let pack = compress(&set, budget);
		let known = set.chunk_ids();

		for item in pack.items() {
			assert!(
				!item.citations.is_empty(),
				"round {round}: item without citation: {:?}",
				item.text
			);

			for citation in &item.citations {
				assert!(
					known.contains(citation),
					"round {round}: citation outside the input retrieval set"
				);
			}
		}
	}
}

#[test]
fn budget_is_respected_across_randomized_sets() {
	let mut rng = XorShift(0x1234_5678_9abc_def1);

	for _ in 0..50 {
		let count = 1 + rng.below(6) as usize;
		let set = RetrievalSet {
			items: (0..count).map(|_| random_chunk(&mut rng)).collect(),
		};
		let budget = 1 + rng.below(60) as u32;
		let pack = compress(&set, budget);
		let used: usize =
			pack.items().map(|item| item.text.split_whitespace().count()).sum();

		assert!(used <= budget as usize, "pack of {used} words exceeds budget {budget}");
	}
}

#[test]
fn retained_chunks_are_a_relevance_prefix() {
	let mut rng = XorShift(0xfeed_beef_cafe_f00d);

	for _ in 0..25 {
		let mut items: Vec<RetrievedChunk> =
			(0..5).map(|_| random_chunk(&mut rng)).collect();

		items.sort_by(|a, b| b.score.total_cmp(&a.score));

		let set = RetrievalSet { items };
		let pack = compress(&set, 40);
		let mut cited = pack.cited_chunk_ids();

		// Whole-chunk truncation drops from the low-relevance tail only.
		let mut expected: Vec<_> =
			set.items.iter().take(cited.len()).map(|chunk| chunk.chunk_id).collect();

		cited.sort();
		expected.sort();

		assert_eq!(cited, expected);
	}
}
