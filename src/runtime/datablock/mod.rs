//! Data blocks
//!
//! A data block is a handle-addressed byte buffer. Tasks list data blocks as
//! dependencies; the runtime acquires each one for the task before the user
//! function runs and releases it afterwards. A free request on a block that
//! still has users is deferred until the last release.

use std::fmt;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, trace};

use super::guid::Guid;
use super::memory::BlockBuffer;

#[cfg(test)]
mod tests;

/// Maximum number of tasks that may hold a block acquired at the same time.
pub const MAX_USERS: usize = 64;

/// Refusals from a data block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataBlockError {
    #[error("data block {0} is being freed")]
    FreeRequested(Guid),

    #[error("data block {0} already has a pending free")]
    DoubleFree(Guid),

    #[error("{user} does not hold data block {block}")]
    NotAcquired { block: Guid, user: Guid },

    #[error("data block {0} has too many users")]
    TooManyUsers(Guid),
}

/// What the caller must do after a release or a free request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRelease {
    /// The block stays alive.
    Retained,
    /// The block has no users left and a free was requested; the caller
    /// destroys it.
    Destroy,
}

#[derive(Debug, Default)]
struct Users {
    holders: SmallVec<[Guid; 4]>,
    free_requested: bool,
}

impl Users {
    fn outcome(&self) -> BlockRelease {
        if self.free_requested && self.holders.is_empty() {
            BlockRelease::Destroy
        } else {
            BlockRelease::Retained
        }
    }
}

/// A byte buffer shared between tasks.
pub struct DataBlock {
    guid: Guid,
    size: usize,
    buffer: RwLock<Option<BlockBuffer>>,
    users: Mutex<Users>,
}

impl DataBlock {
    pub(crate) fn new(
        guid: Guid,
        buffer: BlockBuffer,
    ) -> Self {
        Self {
            guid,
            size: buffer.len(),
            buffer: RwLock::new(Some(buffer)),
            users: Mutex::new(Users::default()),
        }
    }

    #[inline]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks currently holding the block.
    pub fn user_count(&self) -> usize {
        self.users.lock().holders.len()
    }

    pub fn is_free_requested(&self) -> bool {
        self.users.lock().free_requested
    }

    /// Register `user` as a holder. Acquiring twice is a no-op.
    pub fn acquire(
        &self,
        user: Guid,
    ) -> Result<(), DataBlockError> {
        let mut users = self.users.lock();
        if users.free_requested {
            return Err(DataBlockError::FreeRequested(self.guid));
        }
        if users.holders.contains(&user) {
            trace!("{} already holds data block {}", user, self.guid);
            return Ok(());
        }
        if users.holders.len() >= MAX_USERS {
            return Err(DataBlockError::TooManyUsers(self.guid));
        }
        users.holders.push(user);
        trace!("{} acquired data block {} ({} users)", user, self.guid, users.holders.len());
        Ok(())
    }

    /// Drop `user` from the holders.
    pub fn release(
        &self,
        user: Guid,
    ) -> Result<BlockRelease, DataBlockError> {
        let mut users = self.users.lock();
        let Some(pos) = users.holders.iter().position(|h| *h == user) else {
            return Err(DataBlockError::NotAcquired {
                block: self.guid,
                user,
            });
        };
        users.holders.swap_remove(pos);
        trace!("{} released data block {}", user, self.guid);
        Ok(users.outcome())
    }

    /// Request destruction. `user`, when it holds the block, is released
    /// as part of the request.
    pub fn request_free(
        &self,
        user: Option<Guid>,
    ) -> Result<BlockRelease, DataBlockError> {
        let mut users = self.users.lock();
        if users.free_requested {
            return Err(DataBlockError::DoubleFree(self.guid));
        }
        users.free_requested = true;
        if let Some(user) = user {
            if let Some(pos) = users.holders.iter().position(|h| *h == user) {
                users.holders.swap_remove(pos);
            }
        }
        let outcome = users.outcome();
        debug!(
            "free requested on data block {} ({} users left)",
            self.guid,
            users.holders.len()
        );
        Ok(outcome)
    }

    /// Read access to the contents.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.buffer.read(), |b| b.as_deref().unwrap_or_default())
    }

    /// Write access to the contents.
    pub fn write(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.buffer.write(), |b| b.as_deref_mut().unwrap_or_default())
    }

    /// Detach the backing buffer so it can go back to the allocator.
    pub(crate) fn take_buffer(&self) -> Option<BlockBuffer> {
        self.buffer.write().take()
    }
}

impl fmt::Debug for DataBlock {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let users = self.users.lock();
        f.debug_struct("DataBlock")
            .field("guid", &self.guid)
            .field("size", &self.size)
            .field("users", &users.holders.len())
            .field("free_requested", &users.free_requested)
            .finish()
    }
}
