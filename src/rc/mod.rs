//! Remote control protocol core
//!
//! Parameter maps, the operation registry, background jobs and the
//! operations built into the server.

pub mod builtin;
pub mod jobs;
pub mod params;
pub mod registry;

pub use jobs::{JobQueue, Scheduler};
pub use params::Params;
pub use registry::{Call, CallContext, Handler, Registry};

/// Reserved parameter selecting background execution
pub const ASYNC_PARAM: &str = "_async";
