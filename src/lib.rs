//! Owner-scoped record collections for a trading card game community app.
//!
//! Each collection mirrors one relation of a remote store (players, cards,
//! promos, repacks and player payment methods) in a local list, scoped to
//! the signed-in identity. Repacks additionally manage their links to
//! promos.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcg_records::{Config, IdentityProvider, PgStore, Promos, UuidGenerator};
//!
//! # async fn run() -> anyhow::Result<()> {
//! tcg_records::telemetry::init();
//! let config = Config::load();
//! let store = PgStore::connect(&config).await?;
//! store.migrate().await?;
//!
//! let identity = IdentityProvider::default();
//! let promos = Arc::new(Promos::new(Arc::new(store), Arc::new(UuidGenerator)));
//! promos.follow(identity.subscribe());
//! identity.sign_in("user-1");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, AppResult, StoreError, StoreResult};
pub use identity::{AuthState, IdentityProvider};
pub use services::{
    Cards, Collection, CollectionOptions, IdGenerator, IdentityScoped, PlayerMops, Players,
    ProfilePicture, Promos, Repacks, ScopedCollection, SequentialIds, Status, UuidGenerator,
};
pub use storage::{
    BlobStorage, MemoryBlobStorage, MemoryStore, MinioBlobStorage, PgStore, RemoteStore,
};
