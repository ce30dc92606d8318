use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a single outgoing pipe item across its push/pop/release
/// lifecycle, independent of its current queue position.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct PipeItemId(u64);

impl PipeItemId {
    #[inline]
    fn next() -> PipeItemId {
        PipeItemId(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A queued outgoing item plus the bookkeeping the writer needs: whether it
/// is still linked into the pipe (as opposed to held exclusively by the
/// writer while being sent) and its identity for release callbacks.
#[derive(Debug)]
pub struct PipeItem<T> {
    id: PipeItemId,
    item: T,
    linked: bool,
}

impl<T> PipeItem<T> {
    #[inline]
    pub fn id(&self) -> PipeItemId {
        self.id
    }

    #[inline]
    pub fn get(&self) -> &T {
        &self.item
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.item
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.item
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

/// FIFO queue of outgoing items awaiting transmission. Items leave the
/// queue only through `pop_front`, which unlinks them; the caller (the
/// outgoing handler) owns the item for the duration of the send and is
/// responsible for releasing it once fully written.
#[derive(Debug)]
pub struct Pipe<T> {
    items: VecDeque<PipeItem<T>>,
}

impl<T> Pipe<T> {
    #[inline]
    pub fn new() -> Self {
        Pipe {
            items: VecDeque::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends an item to the tail of the pipe. Mirrors `pipe_add`/
    /// `pipe_add_push` in the original: normal priority, sent only after
    /// everything already queued (the original's ring-head insertion, tail
    /// popped first, works out to the same FIFO order as this `VecDeque`'s
    /// `push_back`).
    pub fn push_tail(&mut self, item: T) -> PipeItemId {
        let id = PipeItemId::next();
        self.items.push_back(PipeItem {
            id,
            item,
            linked: true,
        });
        id
    }

    /// Pushes an item to the front of the pipe so it is sent ahead of
    /// everything already queued. Mirrors `pipe_add_tail` in the original,
    /// used for genuinely urgent items that must preempt queued data.
    pub fn push_front(&mut self, item: T) -> PipeItemId {
        let id = PipeItemId::next();
        self.items.push_front(PipeItem {
            id,
            item,
            linked: true,
        });
        id
    }

    /// Inserts `item` immediately after the item identified by `after`.
    /// Mirrors `pipe_add_after`. Falls back to `push_tail` if `after` is no
    /// longer in the pipe (already sent).
    pub fn push_after(&mut self, after: PipeItemId, item: T) -> PipeItemId {
        if let Some(pos) = self.items.iter().position(|i| i.id == after) {
            let id = PipeItemId::next();
            self.items.insert(
                pos + 1,
                PipeItem {
                    id,
                    item,
                    linked: true,
                },
            );
            id
        } else {
            self.push_tail(item)
        }
    }

    /// Removes the head item from the pipe for the writer to take
    /// ownership of. The returned item is unlinked; the caller must call
    /// `release` once it is fully sent.
    pub fn pop_front(&mut self) -> Option<PipeItem<T>> {
        self.items.pop_front().map(|mut i| {
            i.linked = false;
            i
        })
    }

    /// True if the item is still queued (not yet handed to the writer).
    /// Mirrors `pipe_item_is_linked`.
    pub fn is_linked(&self, id: PipeItemId) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    /// Detaches and returns a specific not-yet-sent item by id, wherever it
    /// sits in the queue. Mirrors `pipe_item_remove`/
    /// `pipe_remove_and_release`: used to cancel or supersede a queued item
    /// (e.g. coalescing a stale cursor update) before it is ever sent. The
    /// caller is responsible for releasing the returned item with
    /// `item_pushed=false`.
    pub fn remove(&mut self, id: PipeItemId) -> Option<T> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        self.items.remove(pos).map(|i| i.item)
    }

    /// Removes every queued item without sending them, returning them in
    /// pop order so the caller can release each with `item_pushed=false`.
    /// Used on disconnect and on pipe resets.
    pub fn clear(&mut self) -> Vec<T> {
        self.items.drain(..).map(|i| i.item).collect()
    }
}

impl<T> Default for Pipe<T> {
    #[inline]
    fn default() -> Self {
        Pipe::new()
    }
}
