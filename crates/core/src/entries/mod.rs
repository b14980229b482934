//! Entries module - destination time entries and the destination contract.

mod entries_model;
mod entries_traits;

pub use entries_model::{
    DeleteOutcome, DestinationEntry, DestinationProject, DestinationTask, NewTimeEntry,
    TimeEntryUpdate, UpdateOutcome,
};
pub use entries_traits::DestinationClient;
