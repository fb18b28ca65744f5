// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! Arena

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops;

/// stable reference to a value in an `Arena`
///
/// the index is stored off-by-one so `Option<Handle<T>>` is the same size as `Handle<T>`
pub struct Handle<T> {
    index: NonZeroU32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Handle<T> {
    fn from_position(position: usize) -> Self {
        assert!(position < u32::max_value() as usize, "arena too big");
        Handle {
            index: NonZeroU32::new(position as u32 + 1).expect("known to be non-zero"),
            marker: PhantomData,
        }
    }
    /// the zero-based index of the referenced value
    pub fn index(self) -> usize {
        self.index.get() as usize - 1
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.index.hash(hasher)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, rhs: &Self) -> bool {
        self.index == rhs.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, rhs: &Self) -> Option<Ordering> {
        Some(self.cmp(rhs))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, rhs: &Self) -> Ordering {
        self.index.cmp(&rhs.index)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({})", self.index())
    }
}

/// arena owning values that are referenced by `Handle`s
///
/// values are never removed, so handles stay valid for the arena's lifetime
#[derive(Clone, Debug)]
pub struct Arena<T> {
    values: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// create an empty arena
    pub fn new() -> Self {
        Arena { values: Vec::new() }
    }
    /// the number of values ever allocated in `self`
    pub fn len(&self) -> usize {
        self.values.len()
    }
    /// returns `true` if nothing was allocated in `self`
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    /// allocate a new value, returning a handle to it
    pub fn append(&mut self, value: T) -> Handle<T> {
        let handle = Handle::from_position(self.values.len());
        self.values.push(value);
        handle
    }
    /// get the value referenced by `handle`, if `handle` belongs to `self`
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.values.get(handle.index())
    }
    /// iterate over all values with their handles, in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.values
            .iter()
            .enumerate()
            .map(|(position, value)| (Handle::from_position(position), value))
    }
    /// iterate over all handles, in allocation order
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> {
        (0..self.values.len()).map(Handle::from_position)
    }
}

impl<T> ops::Index<Handle<T>> for Arena<T> {
    type Output = T;
    fn index(&self, handle: Handle<T>) -> &T {
        &self.values[handle.index()]
    }
}

impl<T> ops::IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.values[handle.index()]
    }
}
