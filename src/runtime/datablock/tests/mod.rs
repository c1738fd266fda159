//! DataBlock 单元测试
//!
//! 测试数据块的获取、释放与延迟释放语义

use crate::runtime::datablock::{BlockRelease, DataBlock, DataBlockError, MAX_USERS};
use crate::runtime::guid::Guid;

fn block(size: usize) -> DataBlock {
    DataBlock::new(Guid::from_parts(1, 1), vec![0u8; size].into_boxed_slice())
}

fn task(n: u32) -> Guid {
    Guid::from_parts(100 + n, 1)
}

#[cfg(test)]
mod acquire_tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let db = block(8);
        db.acquire(task(0)).unwrap();
        assert_eq!(db.user_count(), 1);
        assert_eq!(db.release(task(0)), Ok(BlockRelease::Retained));
        assert_eq!(db.user_count(), 0);
    }

    #[test]
    fn test_acquire_is_idempotent_per_user() {
        let db = block(8);
        db.acquire(task(0)).unwrap();
        db.acquire(task(0)).unwrap();
        assert_eq!(db.user_count(), 1);
    }

    #[test]
    fn test_release_without_acquire() {
        let db = block(8);
        assert_eq!(
            db.release(task(3)),
            Err(DataBlockError::NotAcquired {
                block: db.guid(),
                user: task(3),
            })
        );
    }

    #[test]
    fn test_user_limit() {
        let db = block(1);
        for i in 0..MAX_USERS as u32 {
            db.acquire(task(i)).unwrap();
        }
        assert_eq!(
            db.acquire(task(MAX_USERS as u32)),
            Err(DataBlockError::TooManyUsers(db.guid()))
        );
    }
}

#[cfg(test)]
mod free_tests {
    use super::*;

    #[test]
    fn test_free_unused_block_destroys_immediately() {
        let db = block(4);
        assert_eq!(db.request_free(None), Ok(BlockRelease::Destroy));
    }

    #[test]
    fn test_free_while_acquired_is_deferred() {
        let db = block(4);
        db.acquire(task(0)).unwrap();
        db.acquire(task(1)).unwrap();

        assert_eq!(db.request_free(None), Ok(BlockRelease::Retained));
        assert!(db.is_free_requested());
        assert_eq!(db.release(task(0)), Ok(BlockRelease::Retained));
        assert_eq!(db.release(task(1)), Ok(BlockRelease::Destroy));
    }

    #[test]
    fn test_free_by_holder_releases_it() {
        let db = block(4);
        db.acquire(task(0)).unwrap();
        assert_eq!(db.request_free(Some(task(0))), Ok(BlockRelease::Destroy));
    }

    #[test]
    fn test_double_free() {
        let db = block(4);
        db.acquire(task(0)).unwrap();
        db.request_free(None).unwrap();
        assert_eq!(db.request_free(None), Err(DataBlockError::DoubleFree(db.guid())));
    }

    #[test]
    fn test_acquire_after_free_request() {
        let db = block(4);
        db.acquire(task(0)).unwrap();
        db.request_free(None).unwrap();
        assert_eq!(db.acquire(task(1)), Err(DataBlockError::FreeRequested(db.guid())));
    }
}

#[cfg(test)]
mod content_tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let db = block(8);
        db.write()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&db.read()[..4], &[1, 2, 3, 4]);
        assert_eq!(db.size(), 8);
    }

    #[test]
    fn test_contents_empty_after_take() {
        let db = block(8);
        let buffer = db.take_buffer().unwrap();
        assert_eq!(buffer.len(), 8);
        assert!(db.read().is_empty());
        assert!(db.take_buffer().is_none());
    }
}
