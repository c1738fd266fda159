//! Opaque handles for runtime objects
//!
//! Events, tasks, task templates and data blocks are addressed by a [`Guid`].
//! The core never turns a handle into an object by itself; it goes through a
//! [`GuidProvider`], which keeps the handle table behind a trait so a
//! distributed table can be slotted in later.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::datablock::DataBlock;
use super::error::RuntimeResult;
use super::event::Event;
use super::task::{Task, TaskTemplate};

mod slab;

pub use slab::SlabGuidProvider;

#[cfg(test)]
mod tests;

/// 64-bit opaque handle.
///
/// The low 32 bits select a table slot, the high 32 bits carry the slot
/// generation at the time the handle was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(u64);

impl Guid {
    /// "No object" / "no data".
    pub const NULL: Guid = Guid(0);

    /// Raw value that is never issued; marks an unset payload.
    pub(crate) const UNSET_RAW: u64 = u64::MAX;

    /// Build a handle from its slot index and generation.
    #[inline]
    pub const fn from_parts(
        index: u32,
        generation: u32,
    ) -> Self {
        Guid(((generation as u64) << 32) | index as u64)
    }

    /// Rebuild a handle from its raw value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Guid(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Guid {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.is_null() {
            write!(f, "guid:null")
        } else {
            write!(f, "guid:{}#{}", self.index(), self.generation())
        }
    }
}

/// Kind of object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuidKind {
    Event,
    Task,
    Template,
    DataBlock,
}

impl fmt::Display for GuidKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            GuidKind::Event => "event",
            GuidKind::Task => "task",
            GuidKind::Template => "task template",
            GuidKind::DataBlock => "data block",
        };
        f.write_str(name)
    }
}

/// An object stored in the handle table.
#[derive(Clone)]
pub enum RuntimeObject {
    Event(Arc<Event>),
    Task(Arc<Task>),
    Template(Arc<TaskTemplate>),
    DataBlock(Arc<DataBlock>),
}

impl RuntimeObject {
    pub fn kind(&self) -> GuidKind {
        match self {
            RuntimeObject::Event(_) => GuidKind::Event,
            RuntimeObject::Task(_) => GuidKind::Task,
            RuntimeObject::Template(_) => GuidKind::Template,
            RuntimeObject::DataBlock(_) => GuidKind::DataBlock,
        }
    }
}

impl fmt::Debug for RuntimeObject {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            RuntimeObject::Event(e) => f.debug_tuple("Event").field(&e.guid()).finish(),
            RuntimeObject::Task(t) => f.debug_tuple("Task").field(&t.guid()).finish(),
            RuntimeObject::Template(t) => f.debug_tuple("Template").field(&t.name()).finish(),
            RuntimeObject::DataBlock(d) => f.debug_tuple("DataBlock").field(&d.guid()).finish(),
        }
    }
}

/// Handle table seam.
///
/// Allocation is split in two steps so an object can embed its own handle:
/// [`reserve`](GuidProvider::reserve) hands out a fresh handle whose slot
/// resolves to nothing, [`install`](GuidProvider::install) publishes the
/// object behind it.
pub trait GuidProvider: Send + Sync + fmt::Debug {
    /// Reserve a fresh handle.
    fn reserve(&self) -> RuntimeResult<Guid>;

    /// Publish `object` behind a handle returned by `reserve`.
    fn install(
        &self,
        guid: Guid,
        object: RuntimeObject,
    );

    /// Look a handle up. Stale and unknown handles resolve to `None`.
    fn resolve(
        &self,
        guid: Guid,
    ) -> Option<RuntimeObject>;

    /// Invalidate a handle and hand back the object it referred to.
    fn release(
        &self,
        guid: Guid,
    ) -> Option<RuntimeObject>;

    /// Number of handles currently reserved or installed.
    fn live(&self) -> usize;
}
