pub mod blob;
pub mod memory;
pub mod minio;
pub mod postgres;
pub mod remote;

pub use blob::{BlobStorage, MemoryBlobStorage};
pub use memory::{MemoryStore, StoreCall, StoreOp};
pub use minio::MinioBlobStorage;
pub use postgres::PgStore;
pub use remote::{EmbeddedSelect, Filter, Order, RemoteStore, Row};
