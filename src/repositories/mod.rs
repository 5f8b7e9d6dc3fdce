//! Repository layer over the home platform's inventory store.

pub mod job;

pub use job::{JOB_FRAGMENT, JobRepository, JobRepositoryError};
