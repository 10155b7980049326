pub mod cleanup;
pub mod coordinator;
pub mod dao;
pub mod events;
pub mod health;
pub mod keywords;
pub mod privacy;
pub mod storage;
pub mod store;

pub use coordinator::TranscriptionCoordinator;
pub use events::{Event, EventBus};
