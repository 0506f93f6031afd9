pub mod comparator;
pub mod counter;
pub mod engine;
pub mod worker;

pub use comparator::{CompareConfig, FileComparator};
pub use counter::TreeCounter;
pub use engine::{Job, JobOutcome};
pub use worker::SyncWorker;
