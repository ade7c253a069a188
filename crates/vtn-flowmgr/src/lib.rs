//! VTN flow manager - data flow removal
//!
//! A data flow is a forwarding decision realized as one flow entry per
//! switch on its path. This crate keeps data flows consistent with the
//! virtual network model: when a tenant is deleted, a port goes down, a
//! path policy changes or a switch reports an expired flow, the affected
//! flows are removed from the flow store and then uninstalled from the
//! switches.
//!
//! # Architecture
//!
//! ```text
//! trigger ──> [FlowRemover] ──> [FlowStore tx] ──> [RemovedFlows]
//!                 │                                     │
//!            [Selector]                           (worker pool)
//!                                                       ↓
//!                                        [RpcInvocationTracker] ──> switches
//! ```
//!
//! 1. A [`FlowRemover`] is built for the trigger; its [`Selector`] picks
//!    candidates by index lookup, ordered scan or explicit identifiers
//! 2. [`FlowRemoveExecutor::remove_flows`] deletes the selected records and
//!    their index entries in one store transaction on the calling thread
//! 3. If anything was removed, a background task turns the
//!    [`RemovedFlows`] into switch RPCs, bulk or per entry depending on the
//!    switch's OpenFlow version, and waits for them with a bounded timeout
//! 4. The outcome is reported through a [`FlowRemoveHandle`]
//!
//! Removals that belong to a larger unit of work are registered with
//! [`FlowRemoveExecutor::enqueue`] and run only if that unit of work
//! commits.
//!
//! # Key Components
//!
//! - [`flow`]: flow records, per-tenant tables with node/port/tenant
//!   indices, and the flow store
//! - [`remove`]: selectors, removers, removal results, the executor and the
//!   post-commit removal queue
//! - [`rpc`]: flow delete requests and the RPC invocation tracker
//! - [`inventory`]: switch inventory interface
//! - [`config`]: timeouts and worker pool sizing

pub mod config;
pub mod error;
pub mod flow;
pub mod inventory;
pub mod logging;
pub mod remove;
pub mod rpc;

// Lets the shared test mocks name this crate the same way from unit and
// integration tests.
#[cfg(test)]
extern crate self as vtn_flowmgr;

#[cfg(test)]
mod testutil;

pub use config::FlowManagerConfig;
pub use error::{FlowError, FlowResult, RpcError, RpcFailure};
pub use flow::{DataFlow, FlowId, FlowStore, FlowTables};
pub use inventory::{InstalledFlow, InventoryReader, NodeInfo};
pub use remove::{
    FlowRemoveExecutor, FlowRemoveHandle, FlowRemover, RemovalReport, RemovalState, RemovedFlows,
    Selector,
};
pub use rpc::{FlowRpcService, RemoveFlowInput, RpcInvocationTracker};
