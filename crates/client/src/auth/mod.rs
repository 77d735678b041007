//! Anonymous access-token acquisition

mod manager;

pub use manager::{FetchOutcome, TokenManager};
