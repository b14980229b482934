//! SQLite identity store.

mod model;
mod repository;

#[cfg(test)]
mod repository_tests;

pub use model::{IdentityMappingChangeset, IdentityMappingDB};
pub use repository::IdentityMappingRepository;
