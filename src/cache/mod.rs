//! Cache routing state.
//!
//! - [`CacheEndpoint`]: a cache reduced to `scheme://host[:port]`; the unit
//!   of identity for de-duplication and bad-cache matching.
//!
//! - [`CacheManager`]: ordered, de-duplicated caches for one namespace.
//!   The head of the list serves requests until it is marked bad.
//!
//! - [`NamespaceCacheRegistry`]: LRU + TTL map from namespace prefix to its
//!   manager, with longest-prefix lookup. Owned by one filesystem instance
//!   (or shared explicitly through the builder), never global.

pub mod endpoint;
pub mod manager;
pub mod registry;

pub use endpoint::{CacheEndpoint, normalize};
pub use manager::CacheManager;
pub use registry::{NamespaceCacheRegistry, RegistryConfig};
