//! Peer id to entity map, owned by the presentation thread.

use std::collections::btree_map::{self, BTreeMap};

use wire::PeerId;

use crate::entity::NetworkedEntity;

/// Entities of the currently connected peers, iterated in id order.
#[derive(Debug, Clone, Default)]
pub struct EntityDirectory {
    entities: BTreeMap<PeerId, NetworkedEntity>,
}

impl EntityDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entity`, replacing and returning any entity with the same id.
    pub fn insert(&mut self, entity: NetworkedEntity) -> Option<NetworkedEntity> {
        self.entities.insert(entity.id(), entity)
    }

    /// Removes the entity for `id`. Unknown ids are a no-op.
    pub fn remove(&mut self, id: PeerId) -> Option<NetworkedEntity> {
        self.entities.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: PeerId) -> Option<&NetworkedEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut NetworkedEntity> {
        self.entities.get_mut(&id)
    }

    #[must_use]
    pub fn contains(&self, id: PeerId) -> bool {
        self.entities.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.entities.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Values<'_, PeerId, NetworkedEntity> {
        self.entities.values()
    }
}

impl<'a> IntoIterator for &'a EntityDirectory {
    type Item = &'a NetworkedEntity;
    type IntoIter = btree_map::Values<'a, PeerId, NetworkedEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: u32) -> NetworkedEntity {
        NetworkedEntity::new(PeerId::new(id)).unwrap()
    }

    #[test]
    fn insert_and_iterate_in_id_order() {
        let mut directory = EntityDirectory::new();
        assert!(directory.insert(entity(3)).is_none());
        assert!(directory.insert(entity(1)).is_none());
        assert_eq!(directory.len(), 2);
        let ids: Vec<_> = directory.ids().map(PeerId::raw).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(directory.contains(PeerId::new(3)));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut directory = EntityDirectory::new();
        directory.insert(entity(1));
        assert!(directory.remove(PeerId::new(9)).is_none());
        assert!(directory.remove(PeerId::new(1)).is_some());
        assert!(directory.remove(PeerId::new(1)).is_none());
        assert!(directory.is_empty());
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut directory = EntityDirectory::new();
        directory.insert(entity(2));
        let moved = directory
            .get_mut(PeerId::new(2))
            .map(|e| e.set_transform(codec::Vec3::new(1.0, 0.0, 0.0), 0.0));
        assert_eq!(moved, Some(true));
        assert_eq!(directory.get(PeerId::new(2)).map(|e| e.position().x), Some(1.0));
    }
}
