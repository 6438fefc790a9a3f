//! Synchronous record mutations on [`CollectionState`].
//!
//! Copy handling lives on the store module because copies may be kept
//! outside the observable state.

use crate::error::{StoreError, StoreResult};
use crate::state::CollectionState;
use entcache_record::{EntityRef, Record};
use entcache_types::{Id, TempId};
use tracing::debug;

impl CollectionState {
    /// Inserts a record under its effective id and returns that id.
    ///
    /// A record without a canonical id gets a temp id (generated unless it
    /// already carries one) and is also tracked in `temps_by_id`.
    pub fn add_item(&mut self, entity: EntityRef) -> Id {
        let (id, temp) = {
            let record = entity.read();
            (record.id(&self.id_field), record.id(&self.temp_id_field))
        };
        let key = match id {
            Some(id) => id,
            None => {
                let temp = temp.unwrap_or_else(|| {
                    let temp = Id::from(TempId::new());
                    entity.write().insert(&self.temp_id_field, temp.to_value());
                    temp
                });
                self.temps_by_id.insert(temp.clone(), entity.clone());
                temp
            }
        };
        if self.keyed_by_id.insert(key.clone(), entity).is_none() {
            self.ids.push(key.clone());
        }
        key
    }

    pub fn add_items(&mut self, entities: impl IntoIterator<Item = EntityRef>) -> Vec<Id> {
        entities.into_iter().map(|e| self.add_item(e)).collect()
    }

    /// The stored record sharing `data`'s effective id.
    pub fn locate(&self, data: &Record) -> Option<EntityRef> {
        let id = data.effective_id(&self.id_field, &self.temp_id_field)?;
        self.keyed_by_id.get(&id).cloned()
    }

    /// Applies `data` to the stored record with the same effective id.
    ///
    /// Merges with accessors preserved, or replaces every plain field when
    /// `replace_items` is set. The stored record keeps its identity either
    /// way. Returns `None` when nothing is stored under that id.
    pub fn update_item(&mut self, data: &Record) -> Option<EntityRef> {
        let entity = self.locate(data)?;
        apply_update(&entity, data, self.replace_items);
        Some(entity)
    }

    /// Removes the record and anything keyed by the same id.
    pub fn remove_item(&mut self, id: &Id) -> Option<EntityRef> {
        let removed = self.keyed_by_id.remove(id);
        self.ids.retain(|stored| stored != id);
        self.temps_by_id.remove(id);
        self.copies_by_id.remove(id);
        removed
    }

    pub fn remove_items<'a>(&mut self, ids: impl IntoIterator<Item = &'a Id>) {
        for id in ids {
            self.remove_item(id);
        }
    }

    pub fn clear_all(&mut self) {
        self.ids.clear();
        self.keyed_by_id.clear();
        self.temps_by_id.clear();
        self.copies_by_id.clear();
    }

    /// Moves a temp record to its server-assigned id.
    ///
    /// The record keeps its slot in `ids`; if `id` was already listed (the
    /// server record arrived through another path first) the temp slot is
    /// dropped instead. The temp record wins in `keyed_by_id` since callers
    /// hold it.
    pub fn promote_temp_id(&mut self, temp: &Id, id: Id) -> StoreResult<EntityRef> {
        let entity = self
            .temps_by_id
            .remove(temp)
            .ok_or_else(|| StoreError::NotFound(temp.clone()))?;
        self.keyed_by_id.remove(temp);
        entity.write().insert(&self.id_field, id.to_value());

        if self.ids.contains(&id) {
            self.ids.retain(|stored| stored != temp);
        } else if let Some(slot) = self.ids.iter_mut().find(|stored| **stored == *temp) {
            *slot = id.clone();
        } else {
            self.ids.push(id.clone());
        }
        debug!(temp_id = %temp, id = %id, "Promoted temp record");
        self.keyed_by_id.insert(id, entity.clone());
        Ok(entity)
    }
}

/// Merges `data` into `entity`, dropping its plain fields first when `replace`.
pub(crate) fn apply_update(entity: &EntityRef, data: &Record, replace: bool) {
    if replace {
        let mut record = entity.write();
        record.clear_values();
        entcache_record::merge_with_accessors(&mut record, data);
    } else {
        entity.merge(data);
    }
}
