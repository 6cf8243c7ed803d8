pub mod answer;
pub mod events;
pub mod pack;
pub mod query;

pub use answer::{Answer, AnswerEvent, Citation, DocumentInfo, GenerationMetadata};
pub use events::InvalidationEvent;
pub use pack::{ContextItem, ContextKind, ContextPack, compress};
pub use query::{
	AnswerMode, IntentTag, NormalizedQuery, Query, RetrievalSet, RetrievedChunk, normalize_query,
};
