//! Module and interface registry - name to entry-point resolution
//!
//! Modules live for the whole process: they are registered once by the
//! generated `__register` functions and never removed. Lookups are exact
//! name matches. Registering a name twice is not rejected; the later
//! registration wins.

mod handles;

#[cfg(test)]
mod tests;

pub use handles::{ExceptionRef, InterfaceMethodRef, InterfaceRef, ModuleMethodRef, ModuleRef};

use crate::error::ProtocolError;
use crate::runtime::NativeFn;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

struct ModuleEntry {
    name: String,
    methods: HashMap<String, ModuleMethodRef>,
    interfaces: HashMap<String, InterfaceRef>,
    exceptions: HashMap<String, ExceptionRef>,
    constants: Option<NativeFn>,
}

struct MethodEntry {
    module: ModuleRef,
    name: String,
    entry: NativeFn,
}

struct InterfaceEntry {
    module: ModuleRef,
    name: String,
    methods: HashMap<String, InterfaceMethodRef>,
}

struct InterfaceMethodEntry {
    interface: InterfaceRef,
    name: String,
    entry: Option<NativeFn>,
}

struct ExceptionEntry {
    module: ModuleRef,
    name: String,
}

#[derive(Default)]
struct Tables {
    modules: Vec<ModuleEntry>,
    by_name: HashMap<String, ModuleRef>,
    methods: Vec<MethodEntry>,
    interfaces: Vec<InterfaceEntry>,
    interface_methods: Vec<InterfaceMethodEntry>,
    exceptions: Vec<ExceptionEntry>,
}

impl Tables {
    fn module(&self, module: ModuleRef) -> Result<&ModuleEntry, ProtocolError> {
        self.modules.get(module.index()).ok_or(ProtocolError::UnknownHandle {
            kind: "module",
            raw: module.into_raw(),
        })
    }

    fn module_mut(&mut self, module: ModuleRef) -> Result<&mut ModuleEntry, ProtocolError> {
        self.modules
            .get_mut(module.index())
            .ok_or(ProtocolError::UnknownHandle {
                kind: "module",
                raw: module.into_raw(),
            })
    }

    fn interface(&self, iface: InterfaceRef) -> Result<&InterfaceEntry, ProtocolError> {
        self.interfaces
            .get(iface.index())
            .ok_or(ProtocolError::UnknownHandle {
                kind: "interface",
                raw: iface.into_raw(),
            })
    }
}

/// Resolution data for an interface method about to be invoked
pub(crate) struct InterfaceMethodTarget {
    pub interface: String,
    pub method: String,
    pub entry: Option<NativeFn>,
}

/// Summary of one registered module (for diagnostics)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub methods: usize,
    pub interfaces: usize,
    pub exceptions: usize,
    pub has_constants: bool,
}

/// Name -> handle registry for modules, methods, interfaces and exceptions
#[derive(Default)]
pub struct ModuleRegistry {
    tables: RwLock<Tables>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(&self, name: &str) -> ModuleRef {
        let mut tables = self.tables.write();
        let module = ModuleRef::from_index(tables.modules.len());
        tables.modules.push(ModuleEntry {
            name: name.to_owned(),
            methods: HashMap::new(),
            interfaces: HashMap::new(),
            exceptions: HashMap::new(),
            constants: None,
        });
        if tables.by_name.insert(name.to_owned(), module).is_some() {
            warn!(module = name, "module registered twice, later registration wins");
        }
        debug!(event = "register_module", module = name);
        module
    }

    pub fn register_method(
        &self,
        module: ModuleRef,
        name: &str,
        entry: NativeFn,
    ) -> Result<ModuleMethodRef, ProtocolError> {
        let mut tables = self.tables.write();
        tables.module(module)?;
        let method = ModuleMethodRef::from_index(tables.methods.len());
        tables.methods.push(MethodEntry {
            module,
            name: name.to_owned(),
            entry,
        });
        tables.module_mut(module)?.methods.insert(name.to_owned(), method);
        Ok(method)
    }

    pub fn register_constants(&self, module: ModuleRef, entry: NativeFn) -> Result<(), ProtocolError> {
        self.tables.write().module_mut(module)?.constants = Some(entry);
        Ok(())
    }

    pub fn register_interface(&self, module: ModuleRef, name: &str) -> Result<InterfaceRef, ProtocolError> {
        let mut tables = self.tables.write();
        tables.module(module)?;
        let iface = InterfaceRef::from_index(tables.interfaces.len());
        tables.interfaces.push(InterfaceEntry {
            module,
            name: name.to_owned(),
            methods: HashMap::new(),
        });
        tables.module_mut(module)?.interfaces.insert(name.to_owned(), iface);
        Ok(iface)
    }

    pub fn register_interface_method(
        &self,
        iface: InterfaceRef,
        name: &str,
        entry: Option<NativeFn>,
    ) -> Result<InterfaceMethodRef, ProtocolError> {
        let mut tables = self.tables.write();
        tables.interface(iface)?;
        let method = InterfaceMethodRef::from_index(tables.interface_methods.len());
        tables.interface_methods.push(InterfaceMethodEntry {
            interface: iface,
            name: name.to_owned(),
            entry,
        });
        tables.interfaces[iface.index()]
            .methods
            .insert(name.to_owned(), method);
        Ok(method)
    }

    pub fn register_exception(&self, module: ModuleRef, name: &str) -> Result<ExceptionRef, ProtocolError> {
        let mut tables = self.tables.write();
        tables.module(module)?;
        let exception = ExceptionRef::from_index(tables.exceptions.len());
        tables.exceptions.push(ExceptionEntry {
            module,
            name: name.to_owned(),
        });
        tables.module_mut(module)?.exceptions.insert(name.to_owned(), exception);
        Ok(exception)
    }

    pub fn module(&self, name: &str) -> Result<ModuleRef, ProtocolError> {
        self.tables
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownModule {
                name: name.to_owned(),
            })
    }

    pub fn method(&self, module: ModuleRef, name: &str) -> Result<ModuleMethodRef, ProtocolError> {
        let tables = self.tables.read();
        let entry = tables.module(module)?;
        entry
            .methods
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownMethod {
                module: entry.name.clone(),
                name: name.to_owned(),
            })
    }

    pub fn interface(&self, module: ModuleRef, name: &str) -> Result<InterfaceRef, ProtocolError> {
        let tables = self.tables.read();
        let entry = tables.module(module)?;
        entry
            .interfaces
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownInterface {
                module: entry.name.clone(),
                name: name.to_owned(),
            })
    }

    pub fn interface_method(&self, iface: InterfaceRef, name: &str) -> Result<InterfaceMethodRef, ProtocolError> {
        let tables = self.tables.read();
        let entry = tables.interface(iface)?;
        entry
            .methods
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownInterfaceMethod {
                interface: entry.name.clone(),
                name: name.to_owned(),
            })
    }

    pub fn exception(&self, module: ModuleRef, name: &str) -> Result<ExceptionRef, ProtocolError> {
        let tables = self.tables.read();
        let entry = tables.module(module)?;
        entry
            .exceptions
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownException {
                module: entry.name.clone(),
                name: name.to_owned(),
            })
    }

    /// Entry point behind a method handle
    pub(crate) fn method_entry(&self, method: ModuleMethodRef) -> Result<NativeFn, ProtocolError> {
        self.tables
            .read()
            .methods
            .get(method.index())
            .map(|m| m.entry.clone())
            .ok_or(ProtocolError::UnknownHandle {
                kind: "module method",
                raw: method.into_raw(),
            })
    }

    pub(crate) fn constants_entry(&self, module: ModuleRef) -> Result<Option<NativeFn>, ProtocolError> {
        Ok(self.tables.read().module(module)?.constants.clone())
    }

    pub(crate) fn interface_method_target(
        &self,
        method: InterfaceMethodRef,
    ) -> Result<InterfaceMethodTarget, ProtocolError> {
        let tables = self.tables.read();
        let entry = tables
            .interface_methods
            .get(method.index())
            .ok_or(ProtocolError::UnknownHandle {
                kind: "interface method",
                raw: method.into_raw(),
            })?;
        let iface = tables.interface(entry.interface)?;
        let module = tables.module(iface.module)?;
        Ok(InterfaceMethodTarget {
            interface: format!("{}.{}", module.name, iface.name),
            method: entry.name.clone(),
            entry: entry.entry.clone(),
        })
    }

    /// Qualified `Module.method` name for logging
    pub fn method_name(&self, method: ModuleMethodRef) -> Option<String> {
        let tables = self.tables.read();
        let entry = tables.methods.get(method.index())?;
        let module = tables.modules.get(entry.module.index())?;
        Some(format!("{}.{}", module.name, entry.name))
    }

    /// Qualified `Module.Exception` name for logging
    pub fn exception_name(&self, exception: ExceptionRef) -> Option<String> {
        let tables = self.tables.read();
        let entry = tables.exceptions.get(exception.index())?;
        let module = tables.modules.get(entry.module.index())?;
        Some(format!("{}.{}", module.name, entry.name))
    }

    pub fn modules(&self) -> Vec<ModuleSummary> {
        let tables = self.tables.read();
        let mut summaries: Vec<_> = tables
            .modules
            .iter()
            .map(|m| ModuleSummary {
                name: m.name.clone(),
                methods: m.methods.len(),
                interfaces: m.interfaces.len(),
                exceptions: m.exceptions.len(),
                has_constants: m.constants.is_some(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}
