// data/mod.rs

pub mod repository;
pub mod store;
pub mod types;

pub use repository::MetricRepository;
pub use store::{MetricStore, RuleStore};
pub use types::{DataError, DataResult};
