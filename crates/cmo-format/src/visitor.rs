//! Translation between file object indices and live object identities.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::types::ObjectId;

/// Shared by every chunk belonging to one file load or save.
///
/// While reading, index `i` resolves to the identity created for the `i`-th
/// object of the file. While writing, a live identity maps to its position
/// in the saved object table.
#[derive(Debug, Default)]
pub struct FileVisitor {
    created: RefCell<Vec<ObjectId>>,
    saved: RefCell<HashMap<ObjectId, u32>>,
}

impl FileVisitor {
    /// Live identity created for file object `index`.
    ///
    /// Objects that were never created resolve to [`ObjectId::NULL`].
    #[must_use]
    pub fn resolve(&self, index: u32) -> Option<ObjectId> {
        self.created.borrow().get(index as usize).copied()
    }

    /// Position of a live object in the saved table.
    #[must_use]
    pub fn index_of(&self, id: ObjectId) -> Option<u32> {
        self.saved.borrow().get(&id).copied()
    }

    pub fn set_created_ids(&self, ids: Vec<ObjectId>) {
        *self.created.borrow_mut() = ids;
    }

    /// Record the created identity of one file object.
    pub fn set_created_id(&self, index: usize, id: ObjectId) {
        let mut created = self.created.borrow_mut();
        if index >= created.len() {
            created.resize(index + 1, ObjectId::NULL);
        }
        created[index] = id;
    }

    /// Rebuild the saved table from the objects in file order.
    ///
    /// Null identities take a slot but are never looked up.
    pub fn set_saved_ids(&self, ids: &[ObjectId]) {
        let mut saved = self.saved.borrow_mut();
        saved.clear();
        for (index, id) in ids.iter().enumerate() {
            if !id.is_null() {
                saved.entry(*id).or_insert(index as u32);
            }
        }
    }

    #[must_use]
    pub fn created_len(&self) -> usize {
        self.created.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_created() {
        let visitor = FileVisitor::default();
        visitor.set_created_ids(vec![ObjectId(5), ObjectId::NULL]);
        assert_eq!(visitor.resolve(0), Some(ObjectId(5)));
        assert_eq!(visitor.resolve(1), Some(ObjectId::NULL));
        assert_eq!(visitor.resolve(2), None);

        visitor.set_created_id(3, ObjectId(9));
        assert_eq!(visitor.created_len(), 4);
        assert_eq!(visitor.resolve(2), Some(ObjectId::NULL));
        assert_eq!(visitor.resolve(3), Some(ObjectId(9)));
    }

    #[test]
    fn test_saved_indices_first_wins() {
        let visitor = FileVisitor::default();
        visitor.set_saved_ids(&[ObjectId(4), ObjectId::NULL, ObjectId(6), ObjectId(4)]);
        assert_eq!(visitor.index_of(ObjectId(4)), Some(0));
        assert_eq!(visitor.index_of(ObjectId(6)), Some(2));
        assert_eq!(visitor.index_of(ObjectId::NULL), None);
        assert_eq!(visitor.index_of(ObjectId(7)), None);
    }
}
