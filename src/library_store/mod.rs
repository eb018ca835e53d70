mod albums;
mod artists;
mod consensus;
mod error;
mod favorites;
mod ids;
mod models;
mod playlists;
mod schema;
mod songs;
mod store;
mod unit_of_work;
mod users;

pub use consensus::majority_artist_ids;
pub use error::{EntityKind, LibraryError, LibraryResult};
pub use ids::{new_id, now_ts};
pub use models::*;
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use store::{LibraryStore, LibraryStoreOptions};
pub use unit_of_work::UnitOfWork;
