//! Fixed-capacity object pool addressed by generational handles.
//!
//! Sessions and streams never point at each other directly. They hold
//! [`Handle`]s, and a handle whose slot has since been freed (and possibly
//! reused) simply fails lookup.

use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Stable reference into a [`Pool<T>`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index inside the pool. Reused once the slot is freed.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into an integer, e.g. to hand to code that correlates a
    /// response back to its stream later on.
    pub fn into_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self::new(raw as u32, (raw >> 32) as u32)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Slab with a hard capacity. Slots are allocated lazily and recycled LIFO.
pub struct Pool<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
    capacity: usize,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            capacity,
        }
    }

    /// Allocate a slot and build its value with the handle it will live under.
    /// Returns `None` when the pool is exhausted.
    pub fn insert_with(&mut self, build: impl FnOnce(Handle<T>) -> T) -> Option<Handle<T>> {
        self.try_insert_with(|handle| Ok::<T, Infallible>(build(handle)))
            .map(|result| match result {
                Ok(handle) => handle,
                Err(never) => match never {},
            })
    }

    /// Like [`insert_with`](Self::insert_with), but the builder may fail.
    /// A failed build leaves the slot free.
    pub fn try_insert_with<E>(
        &mut self,
        build: impl FnOnce(Handle<T>) -> Result<T, E>,
    ) -> Option<Result<Handle<T>, E>> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.entries.len() < self.capacity => {
                self.entries.push(Entry {
                    generation: 0,
                    value: None,
                });
                (self.entries.len() - 1) as u32
            }
            None => return None,
        };

        let handle = Handle::new(index, self.entries[index as usize].generation);
        match build(handle) {
            Ok(value) => {
                self.entries[index as usize].value = Some(value);
                self.len += 1;
                Some(Ok(handle))
            }
            Err(e) => {
                self.free.push(index);
                Some(Err(e))
            }
        }
    }

    pub fn insert(&mut self, value: T) -> Option<Handle<T>> {
        self.insert_with(|_| value)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.entries
            .get(handle.index())
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.entries
            .get_mut(handle.index())
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Free the slot. Every outstanding copy of `handle` goes stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let entry = self.entries.get_mut(handle.index())?;
        if entry.generation != handle.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Handles of every live entry, in slot order.
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.value.is_some())
            .map(|(index, entry)| Handle::new(index as u32, entry.generation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
