//! Generation-checked slab handle table

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use super::{Guid, GuidProvider, RuntimeObject};
use crate::runtime::arena::{IndexStack, MAX_CAPACITY};
use crate::runtime::error::{RuntimeError, RuntimeResult};

/// First generation handed out for a slot. Generation 0 would let index 0
/// produce `Guid::NULL`.
const FIRST_GENERATION: u32 = 1;

struct Slot {
    generation: AtomicU32,
    object: RwLock<Option<RuntimeObject>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: AtomicU32::new(FIRST_GENERATION),
            object: RwLock::new(None),
        }
    }
}

#[inline]
fn next_generation(generation: u32) -> u32 {
    // u32::MAX is never issued: it would let a handle collide with the
    // unset-payload sentinel.
    match generation.wrapping_add(1) {
        u32::MAX | 0 => FIRST_GENERATION,
        g => g,
    }
}

/// Fixed-capacity handle table.
///
/// Slots are recycled through a lock-free index stack; each slot carries a
/// generation counter that is bumped on release, so a handle that outlived
/// its object resolves to `None` instead of aliasing the next occupant.
pub struct SlabGuidProvider {
    slots: Box<[Slot]>,
    free: IndexStack,
    live: AtomicUsize,
}

impl SlabGuidProvider {
    pub fn with_capacity(capacity: u32) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let slots = (0..capacity).map(|_| Slot::new()).collect::<Vec<_>>();
        Self {
            slots: slots.into_boxed_slice(),
            free: IndexStack::full(capacity),
            live: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(
        &self,
        guid: Guid,
    ) -> Option<&Slot> {
        if guid.is_null() {
            return None;
        }
        self.slots.get(guid.index() as usize)
    }
}

impl fmt::Debug for SlabGuidProvider {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SlabGuidProvider")
            .field("capacity", &self.slots.len())
            .field("live", &self.live.load(Ordering::Relaxed))
            .finish()
    }
}

impl GuidProvider for SlabGuidProvider {
    fn reserve(&self) -> RuntimeResult<Guid> {
        let index = self.free.pop().ok_or(RuntimeError::ResourceExhausted {
            resource: "guid table",
            capacity: self.slots.len(),
        })?;
        let generation = self.slots[index as usize].generation.load(Ordering::Acquire);
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(Guid::from_parts(index, generation))
    }

    fn install(
        &self,
        guid: Guid,
        object: RuntimeObject,
    ) {
        let Some(slot) = self.slot(guid) else {
            crate::fatal!("install on invalid handle {}", guid);
        };
        let mut entry = slot.object.write();
        if slot.generation.load(Ordering::Acquire) != guid.generation() || entry.is_some() {
            crate::fatal!("install on handle {} that is not reserved", guid);
        }
        trace!("guid {} -> {:?}", guid, object.kind());
        *entry = Some(object);
    }

    fn resolve(
        &self,
        guid: Guid,
    ) -> Option<RuntimeObject> {
        let slot = self.slot(guid)?;
        let entry = slot.object.read();
        if slot.generation.load(Ordering::Acquire) != guid.generation() {
            return None;
        }
        entry.clone()
    }

    fn release(
        &self,
        guid: Guid,
    ) -> Option<RuntimeObject> {
        let slot = self.slot(guid)?;
        let object = {
            let mut entry = slot.object.write();
            let generation = slot.generation.load(Ordering::Acquire);
            if generation != guid.generation() {
                return None;
            }
            slot.generation
                .store(next_generation(generation), Ordering::Release);
            entry.take()
        };
        self.free.push(guid.index());
        self.live.fetch_sub(1, Ordering::Relaxed);
        trace!("guid {} released", guid);
        object
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}
