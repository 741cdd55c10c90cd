//! Registration, resolution and invocation

use super::{NativeFn, Runtime};
use crate::error::ProtocolError;
use crate::instances::InstanceRef;
use crate::registry::{ExceptionRef, InterfaceMethodRef, InterfaceRef, ModuleMethodRef, ModuleRef};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

/// Keeps the invocation depth right even if the callee unwinds
struct DepthGuard<'a>(&'a Runtime);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.inner.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Runtime {
    // ========================================================================
    // Registration
    // ========================================================================

    pub fn register_module(&self, name: &str) -> ModuleRef {
        self.inner.registry.register_module(name)
    }

    pub fn register_method<F>(&self, module: ModuleRef, name: &str, entry: F) -> ModuleMethodRef
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        let result = self.inner.registry.register_method(module, name, Arc::new(entry));
        self.check(result)
    }

    /// Register the function `push_module_constants` runs for `module`
    pub fn register_constants<F>(&self, module: ModuleRef, entry: F)
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        let result = self.inner.registry.register_constants(module, Arc::new(entry));
        self.check(result);
    }

    pub fn register_interface(&self, module: ModuleRef, name: &str) -> InterfaceRef {
        let result = self.inner.registry.register_interface(module, name);
        self.check(result)
    }

    /// Register an interface method only hosts implement
    pub fn register_interface_method(&self, iface: InterfaceRef, name: &str) -> InterfaceMethodRef {
        let result = self.inner.registry.register_interface_method(iface, name, None);
        self.check(result)
    }

    /// Register an interface method with a native implementation, used
    /// when the target is a server instance
    pub fn register_interface_impl<F>(&self, iface: InterfaceRef, name: &str, entry: F) -> InterfaceMethodRef
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        let result = self
            .inner
            .registry
            .register_interface_method(iface, name, Some(Arc::new(entry)));
        self.check(result)
    }

    pub fn register_exception(&self, module: ModuleRef, name: &str) -> ExceptionRef {
        let result = self.inner.registry.register_exception(module, name);
        self.check(result)
    }

    // ========================================================================
    // Resolution (unknown names are fatal)
    // ========================================================================

    pub fn module(&self, name: &str) -> ModuleRef {
        let result = self.inner.registry.module(name);
        self.check(result)
    }

    pub fn method(&self, module: ModuleRef, name: &str) -> ModuleMethodRef {
        let result = self.inner.registry.method(module, name);
        self.check(result)
    }

    pub fn interface(&self, module: ModuleRef, name: &str) -> InterfaceRef {
        let result = self.inner.registry.interface(module, name);
        self.check(result)
    }

    pub fn interface_method(&self, iface: InterfaceRef, name: &str) -> InterfaceMethodRef {
        let result = self.inner.registry.interface_method(iface, name);
        self.check(result)
    }

    pub fn exception(&self, module: ModuleRef, name: &str) -> ExceptionRef {
        let result = self.inner.registry.exception(module, name);
        self.check(result)
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Run a native entry point as one invocation
    ///
    /// The outermost invocation optionally starts with fresh safety areas.
    pub(crate) fn run_entry(&self, entry: &NativeFn, kind: &'static str, handle: usize) {
        let depth = self.inner.depth.fetch_add(1, Ordering::AcqRel);
        let _depth = DepthGuard(self);

        if depth == 0 && self.inner.config.auto_clear_safety_area {
            self.clear_server_safety_area();
        }

        let _span = debug_span!("invoke", kind, handle, depth).entered();
        let before = self.stack_len();
        entry(self);

        if self.inner.config.strict_balance {
            let after = self.stack_len();
            debug!(
                event = "invoke_balance",
                kind,
                handle,
                before,
                after,
                delta = after as i64 - before as i64
            );
        }
    }

    /// Invoke a module method; it pops its own arguments and pushes its
    /// result
    ///
    /// An exception the method sets stays in the channel; use
    /// `invoke_module_method_with_exceptions` to observe it.
    pub fn invoke_module_method(&self, method: ModuleMethodRef) {
        let entry = self.inner.registry.method_entry(method);
        let entry = self.check(entry);
        trace!(
            event = "invoke_module_method",
            method = ?self.inner.registry.method_name(method)
        );
        self.run_entry(&entry, "module_method", method.into_raw());
    }

    /// Invoke a module method and drain the exception channel
    pub fn invoke_module_method_with_exceptions(&self, method: ModuleMethodRef) -> Option<ExceptionRef> {
        self.invoke_module_method(method);
        self.take_exception()
    }

    /// Dispatch an interface method to its target
    ///
    /// - Client target: the host runs its implementation through
    ///   `clientMethodExec(method, id)`.
    /// - Server target: the instance is pushed as the receiver (popped
    ///   first by the implementation) and the native implementation runs.
    pub fn invoke_interface_method(&self, method: InterfaceMethodRef, target: InstanceRef) {
        let resolved = self.inner.registry.interface_method_target(method);
        let resolved = self.check(resolved);
        trace!(
            event = "invoke_interface_method",
            interface = %resolved.interface,
            method = %resolved.method,
            target = ?target
        );

        match target {
            InstanceRef::Client(id) => {
                self.call_host(move |host, rt| host.client_method_exec(rt, method, id));
            }
            InstanceRef::Server(id) => {
                let Some(entry) = resolved.entry else {
                    self.fatal(ProtocolError::MissingImplementation {
                        interface: resolved.interface,
                        method: resolved.method,
                    })
                };
                self.push_server_instance(id);
                self.run_entry(&entry, "interface_method", method.into_raw());
            }
        }
    }

    pub fn invoke_interface_method_with_exceptions(
        &self,
        method: InterfaceMethodRef,
        target: InstanceRef,
    ) -> Option<ExceptionRef> {
        self.invoke_interface_method(method, target);
        self.take_exception()
    }

    /// Push a module's constants; nothing when it registered none
    pub fn push_module_constants(&self, module: ModuleRef) {
        let entry = self.inner.registry.constants_entry(module);
        if let Some(entry) = self.check(entry) {
            self.run_entry(&entry, "module_constants", module.into_raw());
        }
    }
}
