//! Flow removal: candidate selection, transactional deletion and switch
//! uninstallation.

mod executor;
mod node_clear;
mod queue;
mod remover;
mod result;
mod selector;
mod stats;

pub use executor::{FlowRemoveExecutor, FlowRemoveHandle, RemovalReport, RemovalState};
pub use queue::FlowRemoverQueue;
pub use remover::{FlowRemover, RemovalKind};
pub use result::{RemovedAllFlows, RemovedDataFlows, RemovedExpiredFlow, RemovedFlows, RpcScope};
pub use selector::{FlowFilter, FlowPredicate, Selector};
pub use stats::{FlowRemoveStats, FlowRemoveStatsSnapshot};
