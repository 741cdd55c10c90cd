//! Table dump - live ids for leak detection

use super::Runtime;
use crate::functions::ServerFuncId;
use crate::instances::ServerInstanceInfo;
use crate::registry::ModuleSummary;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// An id held with a reference count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeldRef {
    pub id: i32,
    pub refs: u32,
}

/// Snapshot of every table
#[derive(Debug, Clone, Serialize)]
pub struct TableDump {
    pub modules: Vec<ModuleSummary>,
    pub server_instances: Vec<ServerInstanceInfo>,
    pub client_instances: Vec<HeldRef>,
    pub server_funcs: Vec<ServerFuncId>,
    pub client_funcs: Vec<HeldRef>,
    pub transients: usize,
    /// Retired transient instance ids still reported as stale
    pub retired_instances: usize,
    pub safety_epoch: u64,
    pub stack_depth: usize,
    pub stack_high_water: usize,
    pub pending_exception: Option<String>,
}

impl TableDump {
    /// No ids held in either direction and nothing left on the stack
    pub fn is_clean(&self) -> bool {
        self.server_instances.is_empty()
            && self.client_instances.is_empty()
            && self.server_funcs.is_empty()
            && self.client_funcs.is_empty()
            && self.stack_depth == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for TableDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "modules: {}", self.modules.len())?;
        for module in &self.modules {
            writeln!(
                f,
                "  {} (methods: {}, interfaces: {}, exceptions: {})",
                module.name, module.methods, module.interfaces, module.exceptions
            )?;
        }

        writeln!(f, "server instances: {}", self.server_instances.len())?;
        for inst in &self.server_instances {
            let transient = if inst.transient { " transient" } else { "" };
            writeln!(f, "  #{} {} (pins: {}){}", inst.id, inst.type_name, inst.pins, transient)?;
        }

        writeln!(f, "client instances: {}", self.client_instances.len())?;
        for held in &self.client_instances {
            writeln!(f, "  #{} (refs: {})", held.id, held.refs)?;
        }

        let server_funcs: Vec<String> = self.server_funcs.iter().map(|id| id.0.to_string()).collect();
        writeln!(f, "server funcs: [{}]", server_funcs.join(", "))?;
        writeln!(f, "client funcs: {}", self.client_funcs.len())?;
        for held in &self.client_funcs {
            writeln!(f, "  #{} (refs: {})", held.id, held.refs)?;
        }

        writeln!(
            f,
            "safety area: epoch {}, {} transient(s), {} retired instance id(s)",
            self.safety_epoch, self.transients, self.retired_instances
        )?;
        writeln!(f, "stack: depth {}, high water {}", self.stack_depth, self.stack_high_water)?;
        match &self.pending_exception {
            Some(name) => write!(f, "pending exception: {}", name),
            None => write!(f, "pending exception: none"),
        }
    }
}

impl Runtime {
    /// Snapshot every table; logged at info level
    pub fn dump_tables(&self) -> TableDump {
        let (stack_depth, stack_high_water) = {
            let stack = self.inner.stack.lock();
            (stack.len(), stack.high_water())
        };

        let dump = TableDump {
            modules: self.inner.registry.modules(),
            server_instances: self.inner.instances.server_instances(),
            client_instances: self
                .inner
                .instances
                .client_instances()
                .into_iter()
                .map(|(id, refs)| HeldRef { id, refs })
                .collect(),
            server_funcs: self.inner.functions.server_ids(),
            client_funcs: self
                .inner
                .functions
                .client_ids()
                .into_iter()
                .map(|(id, refs)| HeldRef { id: id.0, refs })
                .collect(),
            transients: self.inner.safety.len(),
            retired_instances: self.inner.instances.retired_count(),
            safety_epoch: self.inner.safety.epoch(),
            stack_depth,
            stack_high_water,
            pending_exception: self.pending_exception().map(|e| {
                self.inner
                    .registry
                    .exception_name(e)
                    .unwrap_or_else(|| format!("{:#x}", e.into_raw()))
            }),
        };

        info!(
            event = "dump_tables",
            server_instances = dump.server_instances.len(),
            client_instances = dump.client_instances.len(),
            server_funcs = dump.server_funcs.len(),
            client_funcs = dump.client_funcs.len(),
            stack_depth = dump.stack_depth,
            "table dump"
        );
        dump
    }
}
