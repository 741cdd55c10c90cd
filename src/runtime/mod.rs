//! Runtime context - the one object every call site goes through
//!
//! Design: all shared state (stack, registries, id tables, exception slot,
//! safety area, host callbacks) lives in one `RuntimeInner` behind an `Arc`.
//! `Runtime` is a cheap clonable handle to it. The C ABI works on a lazily
//! created global runtime; Rust callers and tests can build their own.
//!
//! Architecture:
//! - `mod.rs` - lifecycle, fatal errors, host hand-off, exceptions, safety area
//! - `values.rs` - stack, instance and function operations
//! - `invoke.rs` - registration, lookup and invocation
//! - `dump.rs` - table dump for leak detection

mod dump;
mod invoke;
mod values;


pub use dump::{HeldRef, TableDump};

use crate::config::{FatalMode, RuntimeConfig};
use crate::dispatch::Dispatcher;
use crate::error::{ProtocolError, RuntimeError};
use crate::exception::ExceptionSlot;
use crate::functions::FunctionTable;
use crate::host::HostCallbacks;
use crate::instances::InstanceRegistry;
use crate::logging;
use crate::registry::{ExceptionRef, ModuleRegistry};
use crate::safety::{SafetyArea, TransientHandle};
use crate::stack::ValueStack;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Native entry point: module methods, constants functions, server
/// functions and native interface implementations
///
/// Arguments are popped from, and results pushed to, the runtime's stack.
pub type NativeFn = Arc<dyn Fn(&Runtime) + Send + Sync>;

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    stack: Mutex<ValueStack>,
    registry: ModuleRegistry,
    instances: InstanceRegistry,
    functions: FunctionTable,
    exception: ExceptionSlot,
    safety: SafetyArea,
    host: RwLock<Option<Arc<dyn HostCallbacks>>>,
    dispatcher: Dispatcher,
    /// Nesting of invocations currently running
    depth: AtomicUsize,
    /// Bumped by every shutdown; handles from an older generation are inert
    generation: AtomicU64,
}

/// Handle to a marshalling runtime
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

static GLOBAL: Lazy<Runtime> = Lazy::new(|| {
    let (config, load_error) = match RuntimeConfig::from_env() {
        Ok(config) => (config, None),
        Err(err) => (RuntimeConfig::default(), Some(err)),
    };
    logging::init_with_config(&config.log);
    if let Some(err) = load_error {
        warn!(error = %err, "failed to load runtime config, using defaults");
    }
    Runtime::new(config)
});

fn fatal_with(mode: FatalMode, err: ProtocolError) -> ! {
    error!(event = "protocol_error", error = %err, "fatal protocol error");
    match mode {
        FatalMode::Panic => panic!("protocol error: {}", err),
        FatalMode::Abort => std::process::abort(),
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let dispatcher = Dispatcher::new(config.dispatch_queue_bound);
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                stack: Mutex::new(ValueStack::new()),
                registry: ModuleRegistry::new(),
                instances: InstanceRegistry::new(),
                functions: FunctionTable::new(),
                exception: ExceptionSlot::new(),
                safety: SafetyArea::new(),
                host: RwLock::new(None),
                dispatcher,
                depth: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Process-wide runtime used by the C ABI
    ///
    /// Configured from `NATIVEIMPL_CONFIG` and `NATIVEIMPL_*` on first use.
    pub fn global() -> &'static Runtime {
        &GLOBAL
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.inner.instances
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.inner.functions
    }

    pub fn safety_area(&self) -> &SafetyArea {
        &self.inner.safety
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Rebuild a runtime from a handle's back-reference, if it is still
    /// alive and has not been shut down since the handle was made
    pub(crate) fn upgrade(weak: &Weak<RuntimeInner>, generation: u64) -> Option<Runtime> {
        let rt = Runtime { inner: weak.upgrade()? };
        (rt.generation() == generation).then_some(rt)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Install the host callbacks and make the calling thread the owner
    /// of all host interaction
    pub fn init<H: HostCallbacks + 'static>(&self, host: H) -> Result<(), RuntimeError> {
        {
            let mut slot = self.inner.host.write();
            if slot.is_some() {
                return Err(RuntimeError::AlreadyInitialized);
            }
            *slot = Some(Arc::new(host));
        }
        self.inner.dispatcher.bind_owner();
        info!(event = "runtime_init", generation = self.generation(), "runtime initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.host.read().is_some()
    }

    /// Drop the host, report leaked ids and forget every instance and
    /// function
    ///
    /// Registered modules survive; they live for the whole process.
    pub fn shutdown(&self) {
        if self.inner.host.write().take().is_none() {
            debug!(event = "runtime_shutdown", "shutdown without init");
        }

        let dump = self.dump_tables();
        if self.inner.config.dump_on_shutdown {
            info!(event = "table_dump", "{}", dump);
        }
        if !dump.server_instances.is_empty() {
            warn!(count = dump.server_instances.len(), "server instances still registered at shutdown");
        }
        if !dump.client_instances.is_empty() {
            warn!(count = dump.client_instances.len(), "client instances still referenced at shutdown");
        }
        if !dump.server_funcs.is_empty() || !dump.client_funcs.is_empty() {
            warn!(
                server = dump.server_funcs.len(),
                client = dump.client_funcs.len(),
                "functions still registered at shutdown"
            );
        }
        if dump.stack_depth > 0 {
            warn!(depth = dump.stack_depth, "values left on the stack at shutdown");
        }

        // handles outliving this point must not reach the next generation
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.dispatcher.close();
        self.inner.instances.clear();
        self.inner.functions.clear();
        self.inner.stack.lock().clear();
        self.inner.exception.take();
        self.inner.safety.clear();
        info!(event = "runtime_shutdown", "runtime shut down");
    }

    // ========================================================================
    // Protocol errors
    // ========================================================================

    /// Log `err` and stop, according to the configured `FatalMode`
    pub fn fatal(&self, err: ProtocolError) -> ! {
        fatal_with(self.inner.config.fatal_mode, err)
    }

    /// Fatal error raised by a handle whose runtime is gone
    pub(crate) fn fatal_detached(err: ProtocolError) -> ! {
        fatal_with(FatalMode::Panic, err)
    }

    /// Unwrap a protocol result, treating an error as fatal
    #[inline]
    pub fn check<T>(&self, result: Result<T, ProtocolError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => self.fatal(err),
        }
    }

    // ========================================================================
    // Host hand-off
    // ========================================================================

    /// Run a host callback on the owner thread and wait for it
    pub(crate) fn call_host<F>(&self, f: F)
    where
        F: FnOnce(&dyn HostCallbacks, &Runtime) + Send + 'static,
    {
        let host = self.inner.host.read().clone();
        let Some(host) = host else {
            self.fatal(ProtocolError::NotInitialized)
        };
        let rt = self.clone();
        let result = self.inner.dispatcher.run(move || f(host.as_ref(), &rt));
        self.check(result)
    }

    /// Run `f` on the owner thread and wait for its result
    ///
    /// This is how a worker thread talks to the host: everything `f` pushes,
    /// pops or calls happens on the thread the host accepts callbacks on.
    pub fn run_on_owner<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&Runtime) -> R + Send + 'static,
    {
        let rt = self.clone();
        let result = self.inner.dispatcher.run(move || f(&rt));
        self.check(result)
    }

    /// Run queued cross-thread callbacks; call from the owner's event loop
    pub fn process_pending_callbacks(&self) -> usize {
        self.inner.dispatcher.process_pending()
    }

    /// Block for one cross-thread callback and run it
    pub fn process_one_callback(&self) -> bool {
        self.inner.dispatcher.process_one()
    }

    // ========================================================================
    // Exception channel
    // ========================================================================

    /// Record a business failure for the caller to drain
    pub fn set_exception(&self, exception: ExceptionRef) {
        if let Some(previous) = self.inner.exception.set(exception) {
            debug!(
                event = "exception_overwritten",
                previous = previous.into_raw(),
                current = exception.into_raw()
            );
        }
    }

    pub fn take_exception(&self) -> Option<ExceptionRef> {
        self.inner.exception.take()
    }

    pub fn pending_exception(&self) -> Option<ExceptionRef> {
        self.inner.exception.peek()
    }

    // ========================================================================
    // Safety area
    // ========================================================================

    pub fn stash_transient<T: Any + Send>(&self, value: T) -> TransientHandle {
        self.inner.safety.stash(value)
    }

    pub fn with_transient<T: Any, R>(&self, handle: TransientHandle, f: impl FnOnce(&T) -> R) -> R {
        let result = self.inner.safety.with(handle, f);
        self.check(result)
    }

    /// Invalidate transient handles and transient server instances
    ///
    /// Once a host is installed it is asked to clear its own safety area at
    /// the same point. Returns the new safety epoch.
    pub fn clear_server_safety_area(&self) -> u64 {
        let epoch = self.inner.safety.clear();
        let expired = self.inner.instances.expire_transients(epoch);
        debug!(event = "server_safety_area_cleared", epoch, expired);
        if self.is_initialized() {
            self.clear_client_safety_area();
        }
        epoch
    }

    /// Ask the host to invalidate its transient state
    pub fn clear_client_safety_area(&self) {
        self.call_host(|host, rt| host.client_clear_safety_area(rt));
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("initialized", &self.is_initialized())
            .field("generation", &self.generation())
            .field("owner", &self.inner.dispatcher.owner())
            .field("stack_depth", &self.stack_len())
            .finish()
    }
}
