//! Owning arena for context resources.
//!
//! Every resource a [`Context`](crate::Context) creates is pushed into one of
//! its arenas and addressed by a typed id carrying the owning context's
//! serial. Items are never removed individually; the context drains each
//! arena in dependency order when it is dropped.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Unique serial for a new arena owner.
pub(crate) fn next_owner() -> u64 {
    NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}

/// Typed index into an [`Arena`].
pub trait ArenaId: Copy + fmt::Debug {
    const KIND: &'static str;

    fn from_parts(owner: u64, index: usize) -> Self;
    fn owner(&self) -> u64;
    fn index(&self) -> usize;
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            owner: u64,
            index: u32,
        }

        impl ArenaId for $name {
            const KIND: &'static str = $kind;

            fn from_parts(owner: u64, index: usize) -> Self {
                Self {
                    owner,
                    index: index as u32,
                }
            }

            fn owner(&self) -> u64 {
                self.owner
            }

            fn index(&self) -> usize {
                self.index as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.index)
            }
        }
    };
}

arena_id!(
    /// A compiled program owned by a context.
    ProgramId,
    "program"
);
arena_id!(
    /// A kernel entry point owned by a context.
    KernelId,
    "kernel"
);
arena_id!(
    /// A device buffer owned by a context.
    BufferId,
    "buffer"
);
arena_id!(
    /// A command queue owned by a context. Queue 0 is the default queue.
    QueueId,
    "queue"
);

pub(crate) struct Arena<I, T> {
    owner: u64,
    items: Vec<T>,
    _id: std::marker::PhantomData<I>,
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new(owner: u64) -> Self {
        Self {
            owner,
            items: Vec::new(),
            _id: std::marker::PhantomData,
        }
    }

    pub fn insert(&mut self, item: T) -> I {
        self.items.push(item);
        I::from_parts(self.owner, self.items.len() - 1)
    }

    fn check(&self, id: I) -> Result<usize> {
        if id.owner() != self.owner || id.index() >= self.items.len() {
            return Err(Error::invalid_handle(format!(
                "{} {:?} does not belong to this context",
                I::KIND,
                id
            )));
        }
        Ok(id.index())
    }

    pub fn get(&self, id: I) -> Result<&T> {
        let index = self.check(id)?;
        Ok(&self.items[index])
    }

    pub fn get_mut(&mut self, id: I) -> Result<&mut T> {
        let index = self.check(id)?;
        Ok(&mut self.items[index])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        let owner = self.owner;
        self.items
            .iter()
            .enumerate()
            .map(move |(i, item)| (I::from_parts(owner, i), item))
    }

    /// Removes every item, oldest first.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }
}
