//! Value stack - the single channel for arguments and results
//!
//! Design: one LIFO sequence of tagged slots shared by both sides of every
//! call. Producers and consumers are generated in matched pairs, so a pop
//! always knows which tag it wants; a mismatch is a protocol error.
//!
//! Architecture:
//! - `value.rs` - slot representation (Tag, Value, Handle)
//! - `codec.rs` - Rust type <-> slot conversions (Marshal)

mod codec;
mod value;

#[cfg(test)]
mod tests;

pub use codec::Marshal;
pub use value::{Handle, Tag, Value};

use crate::error::ProtocolError;
use crate::instances::InstanceRef;
use smallvec::SmallVec;

/// Slots kept inline before spilling to the heap; generated calls rarely
/// carry more than a handful of arguments.
const INLINE_SLOTS: usize = 16;

/// Ordered LIFO sequence of tagged values
#[derive(Debug, Default)]
pub struct ValueStack {
    values: SmallVec<[Value; INLINE_SLOTS]>,
    high_water: usize,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push<T: Marshal>(&mut self, value: T) {
        self.push_value(value.into_value());
    }

    #[inline]
    pub fn push_value(&mut self, value: Value) {
        self.values.push(value);
        self.high_water = self.high_water.max(self.values.len());
    }

    #[inline]
    pub fn push_str(&mut self, value: &str) {
        self.push_value(Value::Str(value.to_owned()));
    }

    #[inline]
    pub fn push_null(&mut self) {
        self.push_value(Value::Null);
    }

    /// Pop the top slot as `T`
    ///
    /// On mismatch the slot stays on the stack so diagnostics can still see it.
    pub fn pop<T: Marshal>(&mut self) -> Result<T, ProtocolError> {
        let value = self
            .values
            .pop()
            .ok_or(ProtocolError::StackUnderflow { expected: T::TAG })?;

        T::from_value(value).map_err(|found| {
            let err = ProtocolError::TagMismatch {
                expected: T::TAG,
                found: found.tag(),
            };
            self.values.push(found);
            err
        })
    }

    /// Pop an instance slot; `None` when the producer pushed null
    pub fn pop_instance(&mut self) -> Result<Option<InstanceRef>, ProtocolError> {
        match self.values.pop() {
            Some(Value::Instance(inst)) => Ok(Some(inst)),
            Some(Value::Null) => Ok(None),
            Some(other) => {
                let found = other.tag();
                self.values.push(other);
                Err(ProtocolError::TagMismatch {
                    expected: Tag::Instance,
                    found,
                })
            }
            None => Err(ProtocolError::StackUnderflow {
                expected: Tag::Instance,
            }),
        }
    }

    /// Push a homogeneous array
    ///
    /// Elements go on last-to-first, followed by the element count, so the
    /// consumer pops the count and then each element in original order.
    pub fn push_array<I>(&mut self, items: I)
    where
        I: IntoIterator,
        I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
        I::Item: Marshal,
    {
        let iter = items.into_iter();
        let count = iter.len();
        for item in iter.rev() {
            self.push(item);
        }
        self.push(count);
    }

    /// Pop an array pushed by `push_array`
    pub fn pop_array<T: Marshal>(&mut self) -> Result<Vec<T>, ProtocolError> {
        let count: usize = self.pop()?;
        let mut items = Vec::with_capacity(count.min(self.values.len()));
        for _ in 0..count {
            items.push(self.pop()?);
        }
        Ok(items)
    }

    pub fn push_string_array<S: AsRef<str>>(&mut self, items: &[S]) {
        self.push_array(items.iter().map(|s| s.as_ref().to_owned()));
    }

    pub fn pop_string_array(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.pop_array()
    }

    /// Tag of the top slot without popping it
    #[inline]
    pub fn peek_tag(&self) -> Option<Tag> {
        self.values.last().map(Value::tag)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Deepest the stack has been since creation or the last `clear`
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Remove and return whatever is left, bottom first
    pub fn drain(&mut self) -> Vec<Value> {
        self.high_water = 0;
        self.values.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.high_water = 0;
    }
}
