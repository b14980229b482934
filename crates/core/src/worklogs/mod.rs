//! Worklogs module - source-side records and the fetch contract.

mod worklogs_model;
mod worklogs_traits;

pub use worklogs_model::{SourceWorklog, WorklogFetch, WorklogFilter};
pub use worklogs_traits::SourceClient;
