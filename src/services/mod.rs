pub mod cards;
pub mod collection;
pub mod ids;
pub mod player_mops;
pub mod players;
pub mod promos;
pub mod repacks;
pub mod scoped;
pub mod status;

pub use cards::Cards;
pub use collection::{Collection, CollectionOptions};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use player_mops::PlayerMops;
pub use players::{Players, ProfilePicture};
pub use promos::Promos;
pub use repacks::Repacks;
pub use scoped::{follow, IdentityScoped, ScopedCollection};
pub use status::Status;
