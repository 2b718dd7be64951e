//! Machine learning building blocks for the availability classifier.

pub mod gbdt;
pub mod metrics;
