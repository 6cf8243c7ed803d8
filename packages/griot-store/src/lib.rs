pub mod kv;
pub mod vector;

mod error;

pub use error::{Error, Result};
pub use kv::{KvStore, MemoryKv, RedisKv};
pub use vector::{QdrantSearch, VectorSearch};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
