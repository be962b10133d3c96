use std::mem;

use crate::pal::Watch;
use crate::{Handle, Handler, RawFd, Source, SourceKey};

/// Insertion-ordered collection of registered sources.
///
/// Sources live in an arena of slots addressed by [`SourceKey`]. Vacant slots form a free list
/// and are reused by later insertions; each reuse bumps the slot generation so that keys of
/// destroyed sources never resolve to a newer occupant. Insertion order is kept by a doubly linked
/// list threaded through the occupied slots by index, giving O(1) removal.
///
/// A source marked as removed stays in its slot and counts toward the number of occupied slots
/// until [`drain_removed()`][Self::drain_removed] destroys it. In the meantime it is invisible to
/// lookups and snapshots and does not count toward [`live_len()`][Self::live_len], which is what
/// the capacity check uses.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    slots: Vec<Slot>,

    /// Head of the free list of vacant slots.
    next_free: Option<usize>,

    /// First and last occupied slots in insertion order.
    first: Option<usize>,
    last: Option<usize>,

    /// Number of occupied slots, including sources pending removal.
    len: usize,

    /// Number of occupied slots whose source is marked as removed.
    pending_removal: usize,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Entry,
}

#[derive(Debug)]
enum Entry {
    Occupied(Occupied),
    Vacant { next_free: Option<usize> },
}

#[derive(Debug)]
struct Occupied {
    source: Source,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of sources physically present, including those pending removal.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Number of sources that are not pending removal.
    pub(crate) fn live_len(&self) -> usize {
        // Cannot underflow: every pending source is also counted in `len`.
        self.len.wrapping_sub(self.pending_removal)
    }

    /// Appends a source after all existing sources.
    pub(crate) fn insert(&mut self, source: Source) -> SourceKey {
        let entry = Entry::Occupied(Occupied {
            source,
            prev: self.last,
            next: None,
        });

        let index = if let Some(index) = self.next_free {
            let slot = self.slot_mut(index);

            let Entry::Vacant { next_free } = slot.entry else {
                unreachable!("free list references occupied slot {index}");
            };

            slot.entry = entry;
            self.next_free = next_free;
            index
        } else {
            self.slots.push(Slot {
                generation: 0,
                entry,
            });

            // Cannot underflow because we just pushed.
            self.slots.len().wrapping_sub(1)
        };

        match self.last {
            Some(last) => self.occupied_mut(last).next = Some(index),
            None => self.first = Some(index),
        }
        self.last = Some(index);

        // Cannot overflow because that would imply more sources than addressable memory.
        self.len = self.len.wrapping_add(1);

        SourceKey {
            index,
            generation: self.slot_mut(index).generation,
        }
    }

    /// Destroys a source, returning it so the caller can release platform resources.
    ///
    /// Returns `None` if the key does not reference a present source.
    pub(crate) fn remove(&mut self, key: SourceKey) -> Option<Source> {
        let next_free = self.next_free;

        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)?;

        if !matches!(slot.entry, Entry::Occupied(_)) {
            return None;
        }

        let Entry::Occupied(occupied) = mem::replace(&mut slot.entry, Entry::Vacant { next_free })
        else {
            unreachable!("slot {} was checked to be occupied", key.index);
        };

        slot.generation = slot.generation.wrapping_add(1);
        self.next_free = Some(key.index);

        match occupied.prev {
            Some(prev) => self.occupied_mut(prev).next = occupied.next,
            None => self.first = occupied.next,
        }

        match occupied.next {
            Some(next) => self.occupied_mut(next).prev = occupied.prev,
            None => self.last = occupied.prev,
        }

        // Neither can underflow: the source was counted when inserted or marked.
        self.len = self.len.wrapping_sub(1);
        if occupied.source.removed {
            self.pending_removal = self.pending_removal.wrapping_sub(1);
        }

        Some(occupied.source)
    }

    /// Returns the source if the key references a present source, pending removal or not.
    pub(crate) fn get(&self, key: SourceKey) -> Option<&Source> {
        let slot = self
            .slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)?;

        match &slot.entry {
            Entry::Occupied(occupied) => Some(&occupied.source),
            Entry::Vacant { .. } => None,
        }
    }

    fn get_mut(&mut self, key: SourceKey) -> Option<&mut Source> {
        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)?;

        match &mut slot.entry {
            Entry::Occupied(occupied) => Some(&mut occupied.source),
            Entry::Vacant { .. } => None,
        }
    }

    /// Iterates over all present sources in insertion order, including those pending removal.
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            registry: self,
            cursor: self.first,
        }
    }

    /// Finds the earliest registered live source with the given file descriptor.
    pub(crate) fn find_by_fd(&self, fd: RawFd) -> Option<SourceKey> {
        self.iter()
            .find(|(_, source)| !source.removed && source.fd == Some(fd))
            .map(|(key, _)| key)
    }

    /// Finds the earliest registered live source with the given handle.
    pub(crate) fn find_by_handle(&self, handle: Handle) -> Option<SourceKey> {
        self.iter()
            .find(|(_, source)| !source.removed && source.handle == Some(handle))
            .map(|(key, _)| key)
    }

    /// Keys of all live sources, in insertion order.
    pub(crate) fn live_keys(&self) -> Vec<SourceKey> {
        self.iter()
            .filter(|(_, source)| !source.removed)
            .map(|(key, _)| key)
            .collect()
    }

    /// Replaces the contents of `buffer` with up to `max_n` live sources in insertion order and
    /// returns how many were copied.
    pub(crate) fn snapshot_into(&self, buffer: &mut Vec<Watch>, max_n: usize) -> usize {
        buffer.clear();
        buffer.extend(
            self.iter()
                .filter(|(_, source)| !source.removed)
                .take(max_n)
                .map(|(key, source)| source.watch(key)),
        );

        buffer.len()
    }

    /// Marks a live source as removed. Returns `false` if the key does not reference a live
    /// source.
    pub(crate) fn mark_removed(&mut self, key: SourceKey) -> bool {
        let Some(source) = self.get_mut(key) else {
            return false;
        };

        if source.removed {
            return false;
        }

        source.removed = true;

        // Cannot overflow because pending sources are a subset of present sources.
        self.pending_removal = self.pending_removal.wrapping_add(1);
        true
    }

    /// Destroys every source marked as removed and returns them in insertion order.
    pub(crate) fn drain_removed(&mut self) -> Vec<Source> {
        if self.pending_removal == 0 {
            return Vec::new();
        }

        let keys = self
            .iter()
            .filter(|(_, source)| source.removed)
            .map(|(key, _)| key)
            .collect::<Vec<_>>();

        keys.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Destroys every source, live or pending removal, and returns them in insertion order.
    pub(crate) fn drain_all(&mut self) -> Vec<Source> {
        let keys = self.iter().map(|(key, _)| key).collect::<Vec<_>>();

        keys.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Takes the callbacks of a live source out of the registry for the duration of a call.
    ///
    /// Returns `None` if the source is gone, pending removal or already executing a callback.
    pub(crate) fn take_handler(&mut self, key: SourceKey) -> Option<Box<dyn Handler>> {
        self.get_mut(key)
            .filter(|source| !source.removed)
            .and_then(Source::take_handler)
    }

    /// Returns callbacks taken by [`take_handler()`][Self::take_handler] to their source.
    ///
    /// While the event loop is iterating, sources are only marked as removed, never destroyed,
    /// so the source is still present when its callback returns.
    pub(crate) fn restore_handler(&mut self, key: SourceKey, handler: Box<dyn Handler>) {
        if let Some(source) = self.get_mut(key) {
            source.restore_handler(handler);
        }
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot {
        self.slots
            .get_mut(index)
            .expect("registry links only reference existing slots")
    }

    fn occupied_mut(&mut self, index: usize) -> &mut Occupied {
        match &mut self.slot_mut(index).entry {
            Entry::Occupied(occupied) => occupied,
            Entry::Vacant { .. } => unreachable!("insertion order list references vacant slot"),
        }
    }
}

/// Iterator over the sources of a [`Registry`] in insertion order.
#[derive(Debug)]
pub(crate) struct Iter<'a> {
    registry: &'a Registry,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (SourceKey, &'a Source);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = self.registry.slots.get(index)?;

        let Entry::Occupied(occupied) = &slot.entry else {
            unreachable!("insertion order list references vacant slot");
        };

        self.cursor = occupied.next;

        Some((
            SourceKey {
                index,
                generation: slot.generation,
            },
            &occupied.source,
        ))
    }
}
