pub mod persistence;
pub mod store;

pub use persistence::{DEFAULT_STORAGE_KEY, PersistenceLayer, Recovered, recover};
pub use store::{SyncCandidate, TimerStore};
