//! Client instances - host objects referenced from native code

use super::{InstanceRef, InstanceRegistry};
use crate::error::ProtocolError;
use crate::registry::{ExceptionRef, InterfaceMethodRef};
use crate::runtime::{Runtime, RuntimeInner};
use std::sync::Weak;
use tracing::trace;

impl InstanceRegistry {
    /// Count one more native reference to a host object
    pub fn retain_client(&self, id: i32) -> u32 {
        let mut count = self.client.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop one native reference; `true` when it was the last
    pub fn release_client(&self, id: i32) -> Result<bool, ProtocolError> {
        let remaining = {
            let mut count = self.client.get_mut(&id).ok_or(ProtocolError::DoubleRelease {
                space: "client instance",
                id,
            })?;
            *count -= 1;
            *count
        };

        if remaining == 0 {
            self.client.remove(&id);
            trace!(event = "client_instance_unreferenced", id);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn client_count(&self) -> usize {
        self.client.len()
    }
}

/// Native reference to a host-owned object
///
/// Every clone is one counted reference. When the last one drops, the host
/// is told through `clientObjectRelease` that native code no longer needs
/// the id.
pub struct ClientObject {
    id: i32,
    runtime: Weak<RuntimeInner>,
    generation: u64,
}

impl ClientObject {
    /// Wrap an id whose reference has already been counted
    pub(crate) fn adopt(runtime: &Runtime, id: i32) -> Self {
        Self {
            id,
            runtime: runtime.downgrade(),
            generation: runtime.generation(),
        }
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    #[inline]
    pub fn instance(&self) -> InstanceRef {
        InstanceRef::Client(self.id)
    }

    fn runtime(&self) -> Option<Runtime> {
        Runtime::upgrade(&self.runtime, self.generation)
    }

    /// Ask the host to run `method` on this object
    ///
    /// Arguments are expected on the stack already.
    pub fn invoke(&self, method: InterfaceMethodRef) {
        match self.runtime() {
            Some(rt) => rt.invoke_interface_method(method, self.instance()),
            None => Runtime::fatal_detached(ProtocolError::NotInitialized),
        }
    }

    pub fn invoke_with_exceptions(&self, method: InterfaceMethodRef) -> Option<ExceptionRef> {
        match self.runtime() {
            Some(rt) => rt.invoke_interface_method_with_exceptions(method, self.instance()),
            None => Runtime::fatal_detached(ProtocolError::NotInitialized),
        }
    }
}

impl Clone for ClientObject {
    fn clone(&self) -> Self {
        if let Some(rt) = self.runtime() {
            rt.instances().retain_client(self.id);
        }
        Self {
            id: self.id,
            runtime: self.runtime.clone(),
            generation: self.generation,
        }
    }
}

impl Drop for ClientObject {
    fn drop(&mut self) {
        // Objects outliving a shutdown belong to a host that is already gone
        if let Some(rt) = self.runtime() {
            rt.release_client_instance(self.id);
        }
    }
}

impl std::fmt::Debug for ClientObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientObject").field("id", &self.id).finish()
    }
}
