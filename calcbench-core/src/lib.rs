mod auth;
mod calculation;
mod config;
mod constants;
mod envelope;
mod metrics;
mod reply;
mod stats;

pub use auth::*;
pub use calculation::*;
pub use config::*;
pub use constants::*;
pub use envelope::*;
pub use metrics::*;
pub use reply::*;
pub use stats::*;
