//! Flow records, per-tenant flow tables and the flow store.

mod store;
mod table;
mod types;

pub use store::{add_flows, new_flow_store, AddFlows, FlowStore, FlowTables, FLOW_STORE_NAME};
pub use table::{IndexKey, VtnFlowTable};
pub use types::{
    is_vtn_cookie, DataFlow, EdgeHost, FlowAction, FlowEntry, FlowId, FlowMatch, VTN_COOKIE_BASE,
    VTN_COOKIE_MASK,
};
