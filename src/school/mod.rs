pub mod cache;
pub mod cached_client;
pub mod client;
pub mod envelope;
pub mod forms;
pub mod mutation;
pub mod types;

pub use cache::ResourceKey;
pub use cached_client::CachedApiClient;
pub use mutation::{MutationError, Mutator};
