pub mod registry;
pub mod runtime;
pub mod stream;

mod error;
mod server;
mod service;
mod session;

pub use crate::error::{ProcessError, ServerError, StreamError};
pub use crate::registry::{DispatchOutcome, DispatchStats, SubscriberRegistry, Subscription};
pub use crate::runtime::{CalcServer, RunningServer, ServerCli};
pub use crate::service::CalcService;
pub use crate::session::{serve_bidi, serve_results};
pub use crate::stream::FrameStream;
