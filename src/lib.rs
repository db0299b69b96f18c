//! pelican-client - cache discovery and failover routing for Pelican data federations
//!
//! A federation is a set of origins that publish namespaces and caches that
//! serve them, fronted by a director that knows who serves what. This crate
//! answers "which URL should I read this object from?" and keeps answering
//! correctly as caches fail:
//!
//! - the director is asked once per namespace for its ranked caches,
//! - the first cache that answers a probe is used, and the rest are
//!   remembered in order,
//! - a failed transfer drops that cache, so the next request for the
//!   namespace goes to the next one.
//!
//! # Example
//!
//! ```rust,no_run
//! use pelican_client::PelicanFileSystem;
//!
//! #[tokio::main]
//! async fn main() -> pelican_client::Result<()> {
//!     let fs = PelicanFileSystem::builder()
//!         .discovery_url("pelican://osg-htc.org")
//!         .build()?;
//!
//!     let bytes = fs.cat_file("/ospool/uc-shared/public/OSG-Staff/validation/test.txt").await?;
//!     println!("{} bytes", bytes.len());
//!
//!     // Federation URLs work too, and bind an unbound filesystem.
//!     let info = fs.info("osdf:///ospool/uc-shared/public/OSG-Staff/validation/test.txt").await?;
//!     println!("{info:?}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod director;
pub mod error;
pub mod filesystem;
pub mod path;
pub mod probe;
pub mod telemetry;
pub mod transfer;

pub use cache::{CacheEndpoint, CacheManager, NamespaceCacheRegistry, RegistryConfig};
pub use config::FederationConfig;
pub use director::{DirectorClient, DiscoveryResult, FederationMetadata};
pub use error::{PelicanError, Result};
pub use filesystem::{FailoverExecutor, ObjectReader, PelicanFileSystem, PelicanFileSystemBuilder};
pub use path::{FederationPath, ObjectPath};
pub use probe::{CacheProber, PreferredCache, WorkingCache};
pub use transfer::{ByteRange, EntryKind, HttpBackend, ObjectInfo, TransferBackend};
