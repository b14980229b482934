//! timesync connect - API clients for Tempo, Jira and Solidtime.
//!
//! Each client implements the matching `timesync-core` contract and shares the
//! retrying HTTP layer in [`http`].

pub mod http;
pub mod jira;
pub mod solidtime;
pub mod tempo;

pub use http::{Auth, HttpClient, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
pub use jira::{JiraClient, JiraIssue};
pub use solidtime::SolidtimeClient;
pub use tempo::{TempoClient, DEFAULT_TEMPO_API_URL};
