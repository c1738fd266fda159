//! Guid 单元测试
//!
//! 测试句柄编码和句柄表的代际检查

use super::*;
use crate::runtime::error::RuntimeError;
use crate::runtime::task::TaskTemplate;

fn template(name: &str) -> RuntimeObject {
    RuntimeObject::Template(Arc::new(TaskTemplate::new(name, 0, 0, |_| Guid::NULL)))
}

fn install(
    table: &SlabGuidProvider,
    name: &str,
) -> Guid {
    let guid = table.reserve().unwrap();
    table.install(guid, template(name));
    guid
}

#[cfg(test)]
mod guid_tests {
    use super::*;

    #[test]
    fn test_parts_roundtrip() {
        let guid = Guid::from_parts(7, 3);
        assert_eq!(guid.index(), 7);
        assert_eq!(guid.generation(), 3);
        assert!(!guid.is_null());
        assert_eq!(Guid::from_raw(guid.raw()), guid);
    }

    #[test]
    fn test_null_display() {
        assert!(Guid::NULL.is_null());
        assert_eq!(Guid::NULL.to_string(), "guid:null");
        assert_eq!(Guid::from_parts(4, 2).to_string(), "guid:4#2");
    }

    #[test]
    fn test_unset_is_not_a_valid_handle() {
        let unset = Guid::from_raw(Guid::UNSET_RAW);
        assert_eq!(unset.generation(), u32::MAX);
    }
}

#[cfg(test)]
mod slab_tests {
    use super::*;

    #[test]
    fn test_reserve_install_resolve() {
        let table = SlabGuidProvider::with_capacity(4);
        let guid = install(&table, "a");

        assert!(!guid.is_null());
        assert_eq!(table.live(), 1);
        match table.resolve(guid) {
            Some(RuntimeObject::Template(t)) => assert_eq!(t.name(), "a"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reserved_slot_resolves_to_nothing() {
        let table = SlabGuidProvider::with_capacity(2);
        let guid = table.reserve().unwrap();
        assert!(table.resolve(guid).is_none());
        assert_eq!(table.live(), 1);
    }

    #[test]
    fn test_release_makes_handle_stale() {
        let table = SlabGuidProvider::with_capacity(1);
        let first = install(&table, "first");
        assert!(table.release(first).is_some());
        assert!(table.resolve(first).is_none());
        assert!(table.release(first).is_none());

        // Same slot, new generation.
        let second = install(&table, "second");
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(table.resolve(first).is_none());
        assert!(table.resolve(second).is_some());
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let table = SlabGuidProvider::with_capacity(2);
        install(&table, "a");
        install(&table, "b");
        match table.reserve() {
            Err(RuntimeError::ResourceExhausted { resource, capacity }) => {
                assert_eq!(resource, "guid table");
                assert_eq!(capacity, 2);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_null_never_resolves() {
        let table = SlabGuidProvider::with_capacity(2);
        install(&table, "a");
        assert!(table.resolve(Guid::NULL).is_none());
        assert!(table.release(Guid::NULL).is_none());
    }

    #[test]
    fn test_out_of_range_index() {
        let table = SlabGuidProvider::with_capacity(2);
        assert!(table.resolve(Guid::from_parts(99, 1)).is_none());
    }

    #[test]
    fn test_object_kind() {
        assert_eq!(template("t").kind(), GuidKind::Template);
    }
}
