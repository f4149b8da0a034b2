//! Bounded storage blocks for class and instance data
//!
//! A `Block` stands in for a zero-initialized byte region of fixed size. Values
//! are placed at byte offsets and keep their own width, so two values can never
//! overlap and nothing is readable outside `0..size`. An untouched offset reads
//! as absent, which is the zeroed state.

use crate::error::{MetaError, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

struct Slot {
    width: usize,
    value: Box<dyn Any + Send + Sync>,
}

pub struct Block {
    size: usize,
    /// Ranges owned by something else (header words, embedded interfaces)
    carved: Vec<Range<usize>>,
    slots: BTreeMap<usize, Slot>,
}

impl Block {
    /// Empty block of `size` bytes
    pub fn zeroed(size: usize) -> Self {
        Self {
            size,
            carved: Vec::new(),
            slots: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// True when nothing has been written since creation or the last `clear`
    #[inline]
    pub fn is_zeroed(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of occupied offsets
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Exclude `range` from writes through this block
    pub(crate) fn carve(&mut self, range: Range<usize>) {
        self.carved.push(range);
    }

    pub(crate) fn carved(&self) -> &[Range<usize>] {
        &self.carved
    }

    pub fn get<T: Any>(&self, offset: usize) -> Option<&T> {
        self.slots.get(&offset)?.value.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self, offset: usize) -> Option<&mut T> {
        self.slots.get_mut(&offset)?.value.downcast_mut::<T>()
    }

    /// True if a value of any type occupies `offset`
    pub fn contains(&self, offset: usize) -> bool {
        self.slots.contains_key(&offset)
    }

    /// Store `value` at `offset`, replacing whatever started there
    pub fn set<T: Any + Send + Sync>(&mut self, offset: usize, value: T) -> Result<()> {
        let width = std::mem::size_of::<T>().max(1);
        let end = offset
            .checked_add(width)
            .ok_or_else(|| MetaError::OutOfRange(format!("offset {offset} overflows")))?;

        if end > self.size {
            return Err(MetaError::OutOfRange(format!(
                "write of {width} bytes at offset {offset} exceeds block size {}",
                self.size
            )));
        }

        if let Some(range) = self.carved.iter().find(|r| r.start < end && offset < r.end) {
            return Err(MetaError::invalid_argument(format!(
                "offset {offset} falls inside reserved range {range:?}"
            )));
        }

        // Previous slot may extend into this one
        if let Some((&start, slot)) = self.slots.range(..offset).next_back() {
            if start + slot.width > offset {
                return Err(MetaError::invalid_argument(format!(
                    "offset {offset} overlaps value stored at {start}"
                )));
            }
        }

        // Next slot may start inside this one
        if let Some((&start, _)) = self.slots.range(offset + 1..).next() {
            if start < end {
                return Err(MetaError::invalid_argument(format!(
                    "value at offset {offset} would overlap value stored at {start}"
                )));
            }
        }

        self.slots.insert(
            offset,
            Slot {
                width,
                value: Box::new(value),
            },
        );
        Ok(())
    }

    /// Remove and return the value at `offset` if it has type `T`
    pub fn take<T: Any>(&mut self, offset: usize) -> Option<T> {
        if !self.slots.get(&offset)?.value.is::<T>() {
            return None;
        }
        let slot = self.slots.remove(&offset)?;
        slot.value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Return to the zeroed state, dropping every stored value
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Clear values and reserved ranges, as if freshly zeroed
    pub(crate) fn reset(&mut self) {
        self.slots.clear();
        self.carved.clear();
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("size", &self.size)
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .field("carved", &self.carved)
            .finish()
    }
}
