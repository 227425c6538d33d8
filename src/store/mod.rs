use crate::contact::ContactHandle;
use crate::errors::{AppError, AppResult};
use crate::group::GroupHandle;
use crate::models::UserId;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Storage for contacts, keyed by id. Listings come back in insertion order.
pub trait ContactStore: Send + Sync {
    fn save(&self, contact: &ContactHandle) -> AppResult<()>;
    fn find_by_id(&self, id: Uuid) -> AppResult<Option<ContactHandle>>;
    fn find_all(&self, include_inactive: bool) -> AppResult<Vec<ContactHandle>>;
    fn find_by_owner(&self, owner_id: UserId, include_inactive: bool) -> AppResult<Vec<ContactHandle>>;
    fn soft_delete(&self, contact: &ContactHandle) -> AppResult<()>;
    fn hard_delete(&self, contact: &ContactHandle) -> AppResult<bool>;
    fn delete_all_for_owner(&self, owner_id: UserId) -> AppResult<usize>;
}

pub trait GroupStore: Send + Sync {
    fn save(&self, group: &GroupHandle) -> AppResult<()>;
    fn find_by_id(&self, id: Uuid) -> AppResult<Option<GroupHandle>>;
    fn find_by_owner(&self, owner_id: UserId) -> AppResult<Vec<GroupHandle>>;
    fn find_all(&self) -> AppResult<Vec<GroupHandle>>;
    fn delete(&self, group: &GroupHandle) -> AppResult<bool>;
}

#[derive(Debug)]
struct Slot<T> {
    seq: u64,
    value: T,
}

#[derive(Debug)]
struct Table<T> {
    next_seq: u64,
    rows: HashMap<Uuid, Slot<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            rows: HashMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    /// Re-saving keeps the original position.
    fn upsert(&mut self, id: Uuid, value: T) {
        if let Some(slot) = self.rows.get_mut(&id) {
            slot.value = value;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.rows.insert(id, Slot { seq, value });
    }

    fn get(&self, id: &Uuid) -> Option<T> {
        self.rows.get(id).map(|slot| slot.value.clone())
    }

    fn remove(&mut self, id: &Uuid) -> bool {
        self.rows.remove(id).is_some()
    }

    fn ordered(&self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut slots = self
            .rows
            .values()
            .filter(|slot| keep(&slot.value))
            .collect::<Vec<_>>();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.value.clone()).collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContactStore {
    table: Mutex<Table<ContactHandle>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> AppResult<std::sync::MutexGuard<'_, Table<ContactHandle>>> {
        self.table
            .lock()
            .map_err(|_| AppError::Internal("contact store mutex poisoned".to_string()))
    }
}

impl ContactStore for InMemoryContactStore {
    fn save(&self, contact: &ContactHandle) -> AppResult<()> {
        self.table()?.upsert(contact.id(), contact.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> AppResult<Option<ContactHandle>> {
        Ok(self.table()?.get(&id))
    }

    fn find_all(&self, include_inactive: bool) -> AppResult<Vec<ContactHandle>> {
        let table = self.table()?;
        Ok(table.ordered(|contact| include_inactive || contact.is_active()))
    }

    fn find_by_owner(&self, owner_id: UserId, include_inactive: bool) -> AppResult<Vec<ContactHandle>> {
        let table = self.table()?;
        Ok(table.ordered(|contact| {
            contact.owner_id() == owner_id && (include_inactive || contact.is_active())
        }))
    }

    fn soft_delete(&self, contact: &ContactHandle) -> AppResult<()> {
        contact.lock().soft_delete();
        self.save(contact)
    }

    fn hard_delete(&self, contact: &ContactHandle) -> AppResult<bool> {
        Ok(self.table()?.remove(&contact.id()))
    }

    fn delete_all_for_owner(&self, owner_id: UserId) -> AppResult<usize> {
        let mut table = self.table()?;
        let before = table.rows.len();
        table.rows.retain(|_, slot| slot.value.owner_id() != owner_id);
        Ok(before - table.rows.len())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGroupStore {
    table: Mutex<Table<GroupHandle>>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> AppResult<std::sync::MutexGuard<'_, Table<GroupHandle>>> {
        self.table
            .lock()
            .map_err(|_| AppError::Internal("group store mutex poisoned".to_string()))
    }
}

impl GroupStore for InMemoryGroupStore {
    fn save(&self, group: &GroupHandle) -> AppResult<()> {
        self.table()?.upsert(group.id(), group.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> AppResult<Option<GroupHandle>> {
        Ok(self.table()?.get(&id))
    }

    fn find_by_owner(&self, owner_id: UserId) -> AppResult<Vec<GroupHandle>> {
        Ok(self.table()?.ordered(|group| group.owner_id() == owner_id))
    }

    fn find_all(&self) -> AppResult<Vec<GroupHandle>> {
        Ok(self.table()?.ordered(|_| true))
    }

    fn delete(&self, group: &GroupHandle) -> AppResult<bool> {
        Ok(self.table()?.remove(&group.id()))
    }
}
