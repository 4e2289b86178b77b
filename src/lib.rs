//! Live cricket match instrumentation
//!
//! Camera frames go through object detection and a rule engine that turns
//! ball trajectories into cricket events; the live scoring engine records
//! them as deliveries in the match store. Predictions and career
//! leaderboards are derived from the stored ball-by-ball history.

pub mod capture;
pub mod career;
pub mod config;
pub mod detection;
pub mod error;
pub mod messaging;
pub mod pipeline;
pub mod prediction;
pub mod rules;
pub mod scoring;
pub mod slug;
pub mod state;
pub mod store;
pub mod utils;

pub use error::AppResult;
