//! Session arena.
//!
//! Sessions live in a slab indexed by a generation-checked token, so a
//! completion that arrives after its session was destroyed resolves to
//! nothing instead of a recycled slot.

use slab::Slab;

use super::session::StreamSession;
use crate::proto::Dialout;

/// Owned handle to a session slot. The generation distinguishes a
/// reused slot from the session the token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken {
    index: usize,
    generation: u64,
}

pub struct SessionRegistry<P: Dialout> {
    slots: Slab<Entry<P>>,
    next_generation: u64,
}

struct Entry<P: Dialout> {
    generation: u64,
    session: StreamSession<P>,
}

impl<P: Dialout> SessionRegistry<P> {
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            next_generation: 0,
        }
    }

    /// Insert a session built from its own token.
    pub fn insert(
        &mut self,
        make: impl FnOnce(SessionToken) -> StreamSession<P>,
    ) -> SessionToken {
        self.next_generation += 1;
        let generation = self.next_generation;

        let entry = self.slots.vacant_entry();
        let token = SessionToken {
            index: entry.key(),
            generation,
        };
        entry.insert(Entry {
            generation,
            session: make(token),
        });

        token
    }

    /// Resolve a token, refusing stale generations.
    pub fn get_mut(&mut self, token: SessionToken) -> Option<&mut StreamSession<P>> {
        self.slots
            .get_mut(token.index)
            .filter(|entry| entry.generation == token.generation)
            .map(|entry| &mut entry.session)
    }

    /// Remove and return the session a token resolves to.
    pub fn remove(&mut self, token: SessionToken) -> Option<StreamSession<P>> {
        match self.slots.get(token.index) {
            Some(entry) if entry.generation == token.generation => {
                Some(self.slots.remove(token.index).session)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<P: Dialout> Default for SessionRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::session::{AckPolicy, IoHandle, StreamSession};
    use crate::proto::Cisco;
    use tokio::sync::mpsc;

    fn insert_session(registry: &mut SessionRegistry<Cisco>) -> SessionToken {
        let (tx, _rx) = mpsc::channel(1);
        registry.insert(|token| {
            StreamSession::new(
                token,
                "10.0.0.1:57000".parse().unwrap(),
                AckPolicy::bounded(1),
                IoHandle::new(tx),
            )
        })
    }

    #[test]
    fn stale_tokens_do_not_resolve() {
        let mut registry = SessionRegistry::<Cisco>::new();

        let first = insert_session(&mut registry);
        assert!(registry.get_mut(first).is_some());
        assert!(registry.remove(first).is_some());
        assert!(registry.get_mut(first).is_none());
        assert!(registry.remove(first).is_none());

        // The slot is reused, the generation is not
        let second = insert_session(&mut registry);
        assert_ne!(first, second);
        assert!(registry.get_mut(first).is_none());
        assert!(registry.get_mut(second).is_some());
        assert_eq!(registry.len(), 1);
    }
}
