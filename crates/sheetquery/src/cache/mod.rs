//! Grid caching and the filtered retrieval path.
//!
//! [`DataCache`] keeps loaded grids per file for a single TTL and evicts
//! the oldest files beyond a cap. [`Retriever`] serves filtered rows from
//! it without involving the planner or the sandbox.

mod retriever;
mod store;

pub use retriever::{RetrievalRequest, RetrievalResult, Retriever, RowFilter};
pub use store::{CacheConfig, CacheStats, DataCache};
