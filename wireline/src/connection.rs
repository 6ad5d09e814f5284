use std::net::SocketAddr;
use std::time::Duration;

/// Immutable facts about a connection, fixed when it is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer_addr: SocketAddr,
    pub local_addr: Option<SocketAddr>,
    /// Whether the transport below is encrypted.
    pub encrypted: bool,
    /// Overrides [`Config::keep_alive_timeout`](crate::Config::keep_alive_timeout).
    pub keep_alive_timeout: Option<Duration>,
}

impl ConnectionInfo {
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            local_addr: None,
            encrypted: false,
            keep_alive_timeout: None,
        }
    }

    pub fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub fn with_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = Some(timeout);
        self
    }
}

/// Opaque connection handle.
///
/// Carries a generation so that completions for a connection that has since
/// been released (and its slot reused) are detected as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnToken {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ConnToken {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        ConnToken { index, generation }
    }

    /// Returns the connection slot index. Useful for indexing into per-connection arrays.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

/// Connection slots with a free list for O(1) allocation.
pub(crate) struct ConnectionTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
}

impl<T> ConnectionTable<T> {
    pub fn new(max_connections: u32) -> Self {
        let slots = (0..max_connections)
            .map(|_| Slot {
                value: None,
                generation: 0,
            })
            .collect();
        // Reversed so `pop` hands out the lowest index first.
        let free_list: Vec<u32> = (0..max_connections).rev().collect();
        ConnectionTable { slots, free_list }
    }

    /// Allocate a slot and fill it with the value built for its token.
    pub fn insert_with(&mut self, make: impl FnOnce(ConnToken) -> T) -> Option<ConnToken> {
        let idx = self.free_list.pop()?;
        let slot = &mut self.slots[idx as usize];
        let token = ConnToken::new(idx, slot.generation);
        slot.value = Some(make(token));
        Some(token)
    }

    /// Release a slot, bumping its generation. Returns the stored value.
    pub fn remove(&mut self, token: ConnToken) -> Option<T> {
        let slot = self.slots.get_mut(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(token.index);
        Some(value)
    }

    pub fn get(&self, token: ConnToken) -> Option<&T> {
        self.slots
            .get(token.index as usize)
            .filter(|s| s.generation == token.generation)?
            .value
            .as_ref()
    }

    pub fn get_mut(&mut self, token: ConnToken) -> Option<&mut T> {
        self.slots
            .get_mut(token.index as usize)
            .filter(|s| s.generation == token.generation)?
            .value
            .as_mut()
    }

    /// Tokens of all occupied slots.
    pub fn tokens(&self) -> Vec<ConnToken> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.value.is_some())
            .map(|(i, s)| ConnToken::new(i as u32, s.generation))
            .collect()
    }

    /// Number of active connections.
    pub fn active_count(&self) -> usize {
        self.slots.len().saturating_sub(self.free_list.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_lowest_first() {
        let mut table = ConnectionTable::new(4);
        let a = table.insert_with(|_| "a").unwrap();
        let b = table.insert_with(|_| "b").unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(table.active_count(), 2);
        assert_eq!(table.get(b), Some(&"b"));
    }

    #[test]
    fn exhausted() {
        let mut table = ConnectionTable::new(1);
        assert!(table.insert_with(|_| ()).is_some());
        assert!(table.insert_with(|_| ()).is_none());
    }

    #[test]
    fn stale_token_after_reuse() {
        let mut table = ConnectionTable::new(1);
        let old = table.insert_with(|t| t).unwrap();
        assert_eq!(table.remove(old), Some(old));
        let new = table.insert_with(|t| t).unwrap();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(table.get(old).is_none());
        assert!(table.remove(old).is_none());
        assert_eq!(table.get_mut(new).copied(), Some(new));
    }

    #[test]
    fn double_remove_is_noop() {
        let mut table = ConnectionTable::new(2);
        let a = table.insert_with(|_| 1).unwrap();
        assert_eq!(table.remove(a), Some(1));
        assert_eq!(table.remove(a), None);
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn tokens_lists_occupied() {
        let mut table = ConnectionTable::new(3);
        let a = table.insert_with(|_| ()).unwrap();
        let b = table.insert_with(|_| ()).unwrap();
        table.remove(a);
        assert_eq!(table.tokens(), vec![b]);
    }
}
