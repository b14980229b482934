//! Mappings module - identity mappings between source worklogs and destination entries.

mod mappings_model;
mod mappings_traits;


pub use mappings_model::{Fingerprint, IdentityMapping, MappingUpsert};
pub use mappings_traits::IdentityStoreTrait;
