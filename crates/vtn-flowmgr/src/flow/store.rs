//! Network-state tree holding every tenant's flow table.

use super::table::VtnFlowTable;
use super::types::{DataFlow, FlowId};
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use vtn_tx_common::{DataStore, TxContext, TxError, TxOutcome, TxResult, TxTask};

/// Name of the flow store, used in log and error messages.
pub const FLOW_STORE_NAME: &str = "vtn-flows";

/// Root of the flow tree: tenant name -> flow table.
///
/// Tables are shared between snapshots. Cloning the tree copies only the
/// tenant map; a table is copied the first time a transaction mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTables {
    tables: BTreeMap<String, Arc<VtnFlowTable>>,
}

/// Transactional store of all VTN flow tables.
pub type FlowStore = DataStore<FlowTables>;

/// Creates an empty flow store.
pub fn new_flow_store(max_retries: u32) -> FlowStore {
    DataStore::new(FLOW_STORE_NAME, FlowTables::default()).with_max_retries(max_retries)
}

impl FlowTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, tenant: &str) -> Option<&VtnFlowTable> {
        self.tables.get(tenant).map(Arc::as_ref)
    }

    /// Returns a writable table, unsharing it from older snapshots.
    pub fn table_mut(&mut self, tenant: &str) -> Option<&mut VtnFlowTable> {
        self.tables.get_mut(tenant).map(Arc::make_mut)
    }

    /// Returns `(tenant, table)` pairs ordered by tenant name.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &VtnFlowTable)> {
        self.tables
            .iter()
            .map(|(name, table)| (name.as_str(), table.as_ref()))
    }

    pub fn tenants(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Total number of flows across all tenants.
    pub fn flow_count(&self) -> usize {
        self.tables.values().map(|table| table.len()).sum()
    }

    /// Looks up a flow by tenant and identifier.
    pub fn flow(&self, tenant: &str, id: &FlowId) -> Option<&DataFlow> {
        self.tables.get(tenant)?.get(id)
    }

    /// Adds a flow to its tenant's table, creating the table if needed.
    ///
    /// Flow identifiers are global, so an identifier used by any tenant is
    /// rejected. So is one above [`FlowId::MAX`], whose cookie would alias
    /// another flow's.
    pub fn add_flow(&mut self, flow: DataFlow) -> FlowResult<()> {
        if !flow.id.fits_cookie() {
            return Err(FlowError::FlowIdOutOfRange(flow.id));
        }
        if self.tables.values().any(|table| table.contains(&flow.id)) {
            return Err(FlowError::DuplicateFlow(flow.id));
        }
        let table = self.tables.entry(flow.tenant.clone()).or_default();
        Arc::make_mut(table)
            .add_flow(flow)
            .map_err(|flow| FlowError::DuplicateFlow(flow.id))
    }

    /// Deletes a tenant's table if it holds no flows.
    pub fn prune_table(&mut self, tenant: &str) -> bool {
        let empty = self.tables.get(tenant).is_some_and(|t| t.is_empty());
        if empty {
            self.tables.remove(tenant);
            return true;
        }
        false
    }

    /// Removes every table.
    pub fn clear(&mut self) -> Vec<(String, VtnFlowTable)> {
        std::mem::take(&mut self.tables)
            .into_iter()
            .map(|(tenant, table)| (tenant, Arc::unwrap_or_clone(table)))
            .collect()
    }

    /// Checks index consistency of every table.
    pub fn check_indices(&self) -> Result<(), String> {
        for (tenant, table) in &self.tables {
            table
                .check_indices()
                .map_err(|e| format!("tenant {}: {}", tenant, e))?;
        }
        Ok(())
    }
}

/// Transaction that installs new flow records.
pub struct AddFlows {
    flows: Vec<DataFlow>,
}

impl AddFlows {
    pub fn new(flows: Vec<DataFlow>) -> Self {
        Self { flows }
    }
}

impl TxTask<FlowTables> for AddFlows {
    type Output = usize;

    fn describe(&self) -> String {
        format!("add-flows[{}]", self.flows.len())
    }

    fn execute(&mut self, ctx: &mut TxContext<'_, FlowTables>) -> TxResult<usize> {
        let tables = ctx.write();
        for flow in &self.flows {
            tables
                .add_flow(flow.clone())
                .map_err(|e| TxError::aborted(e.to_string()))?;
        }
        Ok(self.flows.len())
    }
}

/// Installs `flows` in a single transaction.
///
/// Either every flow is added or, if any identifier is already in use,
/// none is.
pub fn add_flows(store: &FlowStore, flows: Vec<DataFlow>) -> FlowResult<TxOutcome<usize>> {
    let mut task = AddFlows::new(flows);
    let outcome = store.execute(&mut task)?;
    debug!(flows = *outcome.output(), version = outcome.version(), "flows added");
    Ok(outcome)
}
