//! Multi-indexed storage for `(user, item, value)` rating triples.

use crate::error::{Error, Result};

/// Rating triples stored as parallel arrays, with optional by-user and
/// by-item position indices.
///
/// Every active index always holds each triple exactly once; removals keep
/// all of them consistent. The running sum is maintained incrementally, so
/// the average never needs a rescan. Exactly one rating per `(user, item)`
/// pair is assumed throughout: [`add`](RatingStore::add) does not
/// deduplicate, [`find`](RatingStore::find) returns the first match, and
/// [`set_value`](RatingStore::set_value) is the supported way to change a
/// pair's value.
#[derive(Clone, Debug, Default)]
pub struct RatingStore {
    users: Vec<u32>,
    items: Vec<u32>,
    values: Vec<f64>,
    sum: f64,
    by_user: Option<Vec<Vec<usize>>>,
    by_item: Option<Vec<Vec<usize>>>,
    max_user_id: u32,
    max_item_id: u32,
}

fn drop_position(list: &mut Vec<usize>, position: usize) {
    if let Some(at) = list.iter().position(|&p| p == position) {
        list.swap_remove(at);
    }
}

fn replace_position(list: &mut [usize], old: usize, new: usize) {
    if let Some(at) = list.iter().position(|&p| p == old) {
        list[at] = new;
    }
}

impl RatingStore {
    /// Empty store. Each index is independently optional so use cases that
    /// only ever need one access pattern do not pay for the others.
    pub fn new(with_user_index: bool, with_item_index: bool) -> Self {
        Self {
            by_user: with_user_index.then(Vec::new),
            by_item: with_item_index.then(Vec::new),
            ..Self::default()
        }
    }

    /// Build a store from already-parsed triples.
    pub fn from_triples(
        triples: impl IntoIterator<Item = (u32, u32, f64)>,
        with_user_index: bool,
        with_item_index: bool,
    ) -> Self {
        let mut store = Self::new(with_user_index, with_item_index);
        for (user_id, item_id, value) in triples {
            store.add(user_id, item_id, value);
        }
        store
    }

    pub fn add(&mut self, user_id: u32, item_id: u32, value: f64) {
        let position = self.users.len();
        self.users.push(user_id);
        self.items.push(item_id);
        self.values.push(value);
        self.sum += value;
        self.max_user_id = self.max_user_id.max(user_id);
        self.max_item_id = self.max_item_id.max(item_id);
        if let Some(by_user) = &mut self.by_user {
            while by_user.len() <= user_id as usize {
                by_user.push(Vec::new());
            }
            by_user[user_id as usize].push(position);
        }
        if let Some(by_item) = &mut self.by_item {
            while by_item.len() <= item_id as usize {
                by_item.push(Vec::new());
            }
            by_item[item_id as usize].push(position);
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Arithmetic mean of all stored values; NaN for an empty store (the
    /// evaluation layer flags this instead of propagating it silently).
    pub fn average(&self) -> f64 {
        self.sum / self.len() as f64
    }

    pub fn max_user_id(&self) -> u32 {
        self.max_user_id
    }

    pub fn max_item_id(&self) -> u32 {
        self.max_item_id
    }

    pub fn user(&self, position: usize) -> u32 {
        self.users[position]
    }

    pub fn item(&self, position: usize) -> u32 {
        self.items[position]
    }

    pub fn value(&self, position: usize) -> f64 {
        self.values[position]
    }

    pub fn users(&self) -> &[u32] {
        &self.users
    }

    pub fn items(&self) -> &[u32] {
        &self.items
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Positions of a user's ratings; `None` when the by-user index is not
    /// enabled.
    pub fn by_user(&self, user_id: u32) -> Option<&[usize]> {
        self.by_user
            .as_ref()
            .map(|idx| idx.get(user_id as usize).map_or(&[][..], Vec::as_slice))
    }

    pub fn by_item(&self, item_id: u32) -> Option<&[usize]> {
        self.by_item
            .as_ref()
            .map(|idx| idx.get(item_id as usize).map_or(&[][..], Vec::as_slice))
    }

    /// Change a rating's value in place, adjusting the running sum by the
    /// delta.
    pub fn set_value(&mut self, position: usize, value: f64) {
        self.sum += value - self.values[position];
        self.values[position] = value;
    }

    /// Position of the rating for `(user_id, item_id)`, using whichever
    /// active index has the shorter candidate list; falls back to a scan of
    /// all triples when no index is enabled.
    pub fn find(&self, user_id: u32, item_id: u32) -> Option<usize> {
        let user_list = self.by_user(user_id);
        let item_list = self.by_item(item_id);
        match (user_list, item_list) {
            (Some(ul), Some(il)) if il.len() < ul.len() => self.scan_list(il, user_id, item_id),
            (Some(ul), _) => self.scan_list(ul, user_id, item_id),
            (None, Some(il)) => self.scan_list(il, user_id, item_id),
            (None, None) => (0..self.len())
                .find(|&p| self.users[p] == user_id && self.items[p] == item_id),
        }
    }

    fn scan_list(&self, list: &[usize], user_id: u32, item_id: u32) -> Option<usize> {
        list.iter()
            .copied()
            .find(|&p| self.users[p] == user_id && self.items[p] == item_id)
    }

    /// Remove the rating for `(user_id, item_id)`. Returns false when the
    /// pair is not stored.
    pub fn remove(&mut self, user_id: u32, item_id: u32) -> bool {
        match self.find(user_id, item_id) {
            Some(position) => {
                self.remove_at(position);
                true
            }
            None => false,
        }
    }

    /// Remove the triple at `position` from the store and every active
    /// index. The last triple is swapped into the hole, so positions held
    /// across this call are invalidated.
    pub fn remove_at(&mut self, position: usize) {
        let last = self.users.len() - 1;
        let user_id = self.users[position] as usize;
        let item_id = self.items[position] as usize;
        self.sum -= self.values[position];

        if let Some(by_user) = &mut self.by_user {
            drop_position(&mut by_user[user_id], position);
        }
        if let Some(by_item) = &mut self.by_item {
            drop_position(&mut by_item[item_id], position);
        }
        if position != last {
            // the last triple moves into the freed slot
            let moved_user = self.users[last] as usize;
            let moved_item = self.items[last] as usize;
            if let Some(by_user) = &mut self.by_user {
                replace_position(&mut by_user[moved_user], last, position);
            }
            if let Some(by_item) = &mut self.by_item {
                replace_position(&mut by_item[moved_item], last, position);
            }
        }
        self.users.swap_remove(position);
        self.items.swap_remove(position);
        self.values.swap_remove(position);
    }

    /// Remove a user and all of their ratings. Requires the by-user index:
    /// without it the per-item structures could not be kept in sync, which
    /// is a hard error rather than silent divergence.
    pub fn remove_user(&mut self, user_id: u32) -> Result<()> {
        if self.by_user.is_none() {
            return Err(Error::IndexOutOfSync(format!(
                "removing user {user_id} requires the by-user index"
            )));
        }
        while let Some(position) = self
            .by_user
            .as_ref()
            .and_then(|idx| idx.get(user_id as usize))
            .and_then(|list| list.last().copied())
        {
            self.remove_at(position);
        }
        Ok(())
    }

    /// Remove an item and all of its ratings; requires the by-item index.
    pub fn remove_item(&mut self, item_id: u32) -> Result<()> {
        if self.by_item.is_none() {
            return Err(Error::IndexOutOfSync(format!(
                "removing item {item_id} requires the by-item index"
            )));
        }
        while let Some(position) = self
            .by_item
            .as_ref()
            .and_then(|idx| idx.get(item_id as usize))
            .and_then(|list| list.last().copied())
        {
            self.remove_at(position);
        }
        Ok(())
    }
}
