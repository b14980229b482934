//! Settings module - engine-facing sync settings.

mod settings_model;

pub use settings_model::{BillableRule, DriftTolerance, RoutingRules, SyncSettings};
