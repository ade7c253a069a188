//! Switch RPCs used to uninstall flow entries.

mod service;
mod tracker;
mod types;

pub use service::FlowRpcService;
pub use tracker::RpcInvocationTracker;
pub use types::{CookieMatch, RemoveFlowInput};
