// Object registry with per-registry identifiers
//
// Each registry owns its id counter, so ids are reproducible: a fresh (or
// cleared) registry always starts at 0.

use std::collections::BTreeMap;

pub type ObjectId = u32;

/// Monotonic id source
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: ObjectId,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ObjectId {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Objects keyed by id, iterated in insertion order
#[derive(Debug)]
pub struct Registry<T> {
    ids: IdAllocator,
    objects: BTreeMap<ObjectId, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            ids: IdAllocator::new(),
            objects: BTreeMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: T) -> ObjectId {
        let id = self.ids.allocate();
        self.objects.insert(id, object);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.objects.get_mut(&id)
    }

    /// Ids are never reused until `clear`
    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        self.objects.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &T)> {
        self.objects.iter().map(|(&id, object)| (id, object))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectId, &mut T)> {
        self.objects.iter_mut().map(|(&id, object)| (id, object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Drop every object and restart ids at 0
    pub fn clear(&mut self) {
        self.objects.clear();
        self.ids.reset();
    }
}
