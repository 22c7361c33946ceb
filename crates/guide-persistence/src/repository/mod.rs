//! # Repository Module
//!
//! Guide repository over any key-value driver.

pub mod kv_impl;
pub mod traits;

pub use kv_impl::KvGuideRepository;
pub use traits::{GuideRepository, ReconcileReport};
