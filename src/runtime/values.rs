//! Stack, instance and function operations on the runtime

use super::Runtime;
use crate::error::ProtocolError;
use crate::functions::{ClientFunc, ClientFuncId, ServerFuncId};
use crate::instances::{ClientObject, InstanceRef};
use crate::registry::ExceptionRef;
use crate::stack::{Marshal, Tag};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, trace};

impl Runtime {
    // ========================================================================
    // Value stack
    // ========================================================================

    #[inline]
    pub fn push<T: Marshal>(&self, value: T) {
        self.inner.stack.lock().push(value);
    }

    #[inline]
    pub fn push_str(&self, value: &str) {
        self.inner.stack.lock().push_str(value);
    }

    #[inline]
    pub fn push_null(&self) {
        self.inner.stack.lock().push_null();
    }

    /// Pop the top slot as `T`; a mismatch or an empty stack is fatal
    #[inline]
    pub fn pop<T: Marshal>(&self) -> T {
        let result = self.try_pop();
        self.check(result)
    }

    #[inline]
    pub fn try_pop<T: Marshal>(&self) -> Result<T, ProtocolError> {
        self.inner.stack.lock().pop()
    }

    pub fn push_array<I>(&self, items: I)
    where
        I: IntoIterator,
        I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
        I::Item: Marshal,
    {
        self.inner.stack.lock().push_array(items);
    }

    pub fn pop_array<T: Marshal>(&self) -> Vec<T> {
        let result = self.inner.stack.lock().pop_array();
        self.check(result)
    }

    pub fn push_string_array<S: AsRef<str>>(&self, items: &[S]) {
        self.inner.stack.lock().push_string_array(items);
    }

    pub fn pop_string_array(&self) -> Vec<String> {
        let result = self.inner.stack.lock().pop_string_array();
        self.check(result)
    }

    pub fn peek_tag(&self) -> Option<Tag> {
        self.inner.stack.lock().peek_tag()
    }

    pub fn stack_len(&self) -> usize {
        self.inner.stack.lock().len()
    }

    // ========================================================================
    // Instances
    // ========================================================================

    pub fn push_client_instance(&self, id: i32) {
        self.push(InstanceRef::Client(id));
    }

    pub fn push_server_instance(&self, id: i32) {
        self.push(InstanceRef::Server(id));
    }

    /// Pop an instance reference; `None` for null
    pub fn pop_instance(&self) -> Option<InstanceRef> {
        let result = self.inner.stack.lock().pop_instance();
        self.check(result)
    }

    /// Lend a native object to the host and push its id
    pub fn push_server_object<T: Any + Send + Sync>(&self, object: Arc<T>) -> i32 {
        let id = self.inner.instances.register_server(object);
        let id = self.check(id);
        self.push_server_instance(id);
        id
    }

    /// Lend a native object that is only valid until the next
    /// `clear_server_safety_area`
    pub fn push_transient_server_instance<T: Any + Send + Sync>(&self, object: Arc<T>) -> i32 {
        let epoch = self.inner.safety.epoch();
        let id = self.inner.instances.register_transient(object, epoch);
        let id = self.check(id);
        self.push_server_instance(id);
        id
    }

    /// Run `f` on a server object, pinned for the duration
    pub fn with_server_instance<T, R>(&self, id: i32, f: impl FnOnce(&T) -> R) -> R
    where
        T: Any + Send + Sync,
    {
        let pin = self.inner.instances.pin::<T>(id);
        let pin = self.check(pin);
        f(&pin)
    }

    pub fn server_instance<T: Any + Send + Sync>(&self, id: i32) -> Arc<T> {
        let pin = self.inner.instances.pin::<T>(id);
        self.check(pin).to_arc()
    }

    /// Pop a server instance and resolve it to its object
    pub fn pop_server_object<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self.pop_instance()? {
            InstanceRef::Server(id) => Some(self.server_instance(id)),
            InstanceRef::Client(id) => self.fatal(ProtocolError::InstanceSpaceMismatch {
                expected: "server",
                id,
            }),
        }
    }

    /// The host holds no more references to a server instance
    pub fn release_server_instance(&self, id: i32) {
        let result = self.inner.instances.release_server(id);
        self.check(result);
    }

    /// Take a counted reference to a host object
    pub fn adopt_client_instance(&self, id: i32) -> ClientObject {
        self.inner.instances.retain_client(id);
        ClientObject::adopt(self, id)
    }

    /// Pop a client instance and take a reference to it
    pub fn pop_client_object(&self) -> Option<ClientObject> {
        match self.pop_instance()? {
            InstanceRef::Client(id) => Some(self.adopt_client_instance(id)),
            InstanceRef::Server(id) => self.fatal(ProtocolError::InstanceSpaceMismatch {
                expected: "client",
                id,
            }),
        }
    }

    /// Drop one native reference to a host object, telling the host when
    /// it was the last
    pub(crate) fn release_client_instance(&self, id: i32) {
        let last = self.inner.instances.release_client(id);
        if self.check(last) {
            debug!(event = "client_object_release", id);
            self.call_host(move |host, rt| host.client_object_release(rt, id));
        }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    pub fn push_client_func(&self, id: ClientFuncId) {
        self.push(id);
    }

    /// Pop a host callable and take a reference to it
    pub fn pop_client_func(&self) -> ClientFunc {
        let id: ClientFuncId = self.pop();
        self.inner.functions.retain_client(id);
        ClientFunc::adopt(self, id)
    }

    pub(crate) fn exec_client_func(&self, id: ClientFuncId) {
        trace!(event = "client_func_exec", id = id.0);
        self.call_host(move |host, rt| host.client_func_exec(rt, id));
    }

    pub(crate) fn release_client_func(&self, id: ClientFuncId) {
        let last = self.inner.functions.release_client(id);
        if self.check(last) {
            debug!(event = "client_func_release", id = id.0);
            self.call_host(move |host, rt| host.client_func_release(rt, id));
        }
    }

    /// Register a native callable for the host without pushing it
    pub fn register_server_func<F>(&self, f: F) -> ServerFuncId
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        let id = self.inner.functions.register_server(Arc::new(f));
        self.check(id)
    }

    /// Hand a native callable to the host
    pub fn push_server_func<F>(&self, f: F) -> ServerFuncId
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        let id = self.register_server_func(f);
        self.push(id);
        id
    }

    pub fn pop_server_func(&self) -> ServerFuncId {
        self.pop()
    }

    pub fn exec_server_func(&self, id: ServerFuncId) {
        let entry = self.inner.functions.server(id);
        let entry = self.check(entry);
        self.run_entry(&entry, "server_func", id.0 as usize);
    }

    pub fn exec_server_func_with_exceptions(&self, id: ServerFuncId) -> Option<ExceptionRef> {
        self.exec_server_func(id);
        self.take_exception()
    }

    pub fn release_server_func(&self, id: ServerFuncId) {
        let result = self.inner.functions.release_server(id);
        self.check(result);
    }
}
