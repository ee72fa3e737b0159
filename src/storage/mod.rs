//! Persistence and object storage
//!
//! - [`rows`] - Row-oriented SQL primitives and the SQLite schema
//! - [`repository`] - Typed queries over the four group tables
//! - [`object`] - Remote bucket the content bundles are published to

pub mod object;
pub mod repository;
pub mod rows;

pub use object::{
    public_object_url, CorsRule, ObjectMeta, ObjectStore, S3ObjectStore, S3ObjectStoreConfig,
    SharedObjectStore,
};
pub use repository::ControlRepository;
pub use rows::{Row, RowStore, SharedRowStore, SqlArg, SqliteRowStore};
