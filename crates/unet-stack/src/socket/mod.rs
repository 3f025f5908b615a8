//! Socket arena, event-mask bookkeeping, callback dispatch and round-robin egress.
//!
//! Sockets live in a [`Slab`] owned by a [`SocketSet`] and are addressed by [`SocketId`]s pairing
//! the slab key with a serial number that is never reused, so a stale id (of a destroyed socket) is
//! detected rather than aliasing a new socket that took over its key. Two intrusive lists are
//! threaded through the slab entries: the callback list (sockets whose subscribed and pending
//! masks overlap) and the dirty list (sockets with queued egress frames).
//!
//! Socket callbacks and the pop hook receive the host (`&mut H`), which owns the set; the set never
//! holds a borrow across those calls, so they may mutate or destroy any socket, including the one
//! being serviced.

pub(crate) mod list;
pub mod raw;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use slab::Slab;

use crate::error::{Error, Result};
use crate::event::Events;
use crate::frame::Frame;
use crate::queue::{Queue, QueuePolicy};
use list::{IndexList, Link, Linked, ListKind};

/// Callback invoked with the events a socket is subscribed to and has pending.
pub type SocketCallback<H> = Rc<RefCell<dyn FnMut(&mut H, SocketId, Events) -> Result<()>>>;

/// The owner of a [`SocketSet`].
pub trait SocketHost: Sized + 'static {
    /// Per-socket state of the concrete socket type.
    type State;

    fn socket_set(&mut self) -> &mut SocketSet<Self>;

    /// Called after a frame was popped from socket `id`'s egress queue. May mutate or destroy any
    /// socket.
    fn on_frame_popped(&mut self, id: SocketId) -> Result<()> {
        let _ = id;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId {
    key: usize,
    serial: u64,
}

impl SocketId {
    fn index(self) -> usize {
        self.key
    }
}

pub struct Socket<H: SocketHost> {
    pub state: H::State,
    send_queue: Queue,
    subscribed: Events,
    pending: Events,
    callback: SocketCallback<H>,
}

impl<H: SocketHost> Socket<H> {
    pub fn subscribed(&self) -> Events {
        self.subscribed
    }

    pub fn pending(&self) -> Events {
        self.pending
    }

    pub fn send_queue(&self) -> &Queue {
        &self.send_queue
    }
}

struct Slot<H: SocketHost> {
    serial: u64,
    links: [Link; 2],
    socket: Socket<H>,
}

impl<H: SocketHost> Slot<H> {
    fn id(&self, key: usize) -> SocketId {
        SocketId {
            key,
            serial: self.serial,
        }
    }
}

impl<H: SocketHost> Linked for Slot<H> {
    fn link(&self, list: ListKind) -> &Link {
        &self.links[list as usize]
    }

    fn link_mut(&mut self, list: ListKind) -> &mut Link {
        &mut self.links[list as usize]
    }
}

pub struct SocketSet<H: SocketHost> {
    slots: Slab<Slot<H>>,
    next_serial: u64,
    callbacks: IndexList,
    dirty: IndexList,
    dispatching: bool,
}

impl<H: SocketHost> Default for SocketSet<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: SocketHost> fmt::Debug for SocketSet<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketSet")
            .field("len", &self.slots.len())
            .field("callbacks", &self.callbacks.len())
            .field("dirty", &self.dirty.len())
            .field("dispatching", &self.dispatching)
            .finish()
    }
}

impl<H: SocketHost> SocketSet<H> {
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            next_serial: 0,
            callbacks: IndexList::new(ListKind::Callback),
            dirty: IndexList::new(ListKind::Dirty),
            dispatching: false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of sockets with queued egress frames.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Number of sockets due a callback on the next dispatch.
    pub fn callback_len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = SocketId> + '_ {
        self.slots.iter().map(|(key, slot)| slot.id(key))
    }

    /// Add a socket with an egress queue of `send_queue_len` (measured per `policy`).
    pub fn insert(
        &mut self,
        state: H::State,
        send_queue_len: usize,
        policy: QueuePolicy,
        callback: impl FnMut(&mut H, SocketId, Events) -> Result<()> + 'static,
    ) -> SocketId {
        let socket = Socket {
            state,
            send_queue: Queue::with_policy(send_queue_len, policy),
            subscribed: Events::empty(),
            pending: Events::empty(),
            callback: Rc::new(RefCell::new(callback)),
        };
        let serial = self.next_serial;
        self.next_serial += 1;
        let key = self.slots.insert(Slot {
            serial,
            links: Default::default(),
            socket,
        });
        SocketId { key, serial }
    }

    pub fn contains(&self, id: SocketId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: SocketId) -> Option<&Socket<H>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.serial == id.serial)
            .map(|slot| &slot.socket)
    }

    pub fn get_mut(&mut self, id: SocketId) -> Option<&mut Socket<H>> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.serial == id.serial)
            .map(|slot| &mut slot.socket)
    }

    pub fn state(&self, id: SocketId) -> Option<&H::State> {
        self.get(id).map(|s| &s.state)
    }

    pub fn state_mut(&mut self, id: SocketId) -> Option<&mut H::State> {
        self.get_mut(id).map(|s| &mut s.state)
    }

    /// Remove a socket, dropping its queued frames, and return its state. Stale ids are ignored.
    pub fn destroy(&mut self, id: SocketId) -> Option<H::State> {
        if !self.contains(id) {
            return None;
        }
        let index = id.index();
        self.callbacks.unlink(&mut self.slots, index);
        self.dirty.unlink(&mut self.slots, index);
        let slot = self.slots.try_remove(index)?;
        Some(slot.socket.state)
    }

    /// Destroy every socket.
    pub fn clear(&mut self) {
        let ids: Vec<_> = self.ids().collect();
        for id in ids {
            self.destroy(id);
        }
    }

    /// Whether the socket's egress queue can take a frame costing `cost`.
    pub fn has_capacity(&self, id: SocketId, cost: usize) -> bool {
        self.get(id).is_some_and(|s| s.send_queue.has_capacity(cost))
    }

    pub fn has_queued_frames(&self, id: SocketId) -> bool {
        self.get(id).is_some_and(|s| !s.send_queue.is_empty())
    }

    /// Queue `frame` for egress, or hand it back if the queue is full (or the socket is gone).
    pub fn send_frame(&mut self, id: SocketId, frame: Frame) -> Result<(), Frame> {
        let Some(socket) = self.get_mut(id) else {
            return Err(frame);
        };
        let was_empty = socket.send_queue.is_empty();
        socket.send_queue.push(frame)?;
        if was_empty {
            self.dirty.push_back(&mut self.slots, id.index());
        }
        Ok(())
    }

    /// Pop the next egress frame of socket `id`, then run the host's pop hook.
    ///
    /// The socket moves to the back of the dirty list if it still has frames queued. If the hook
    /// fails, the popped frame is dropped and the error returned.
    pub fn pop_frame(host: &mut H, id: SocketId) -> Result<Option<Frame>> {
        let set = host.socket_set();
        let Some(socket) = set.get_mut(id) else {
            return Ok(None);
        };
        let Some(frame) = socket.send_queue.pop() else {
            return Ok(None);
        };
        let more = !socket.send_queue.is_empty();
        set.dirty.unlink(&mut set.slots, id.index());
        if more {
            set.dirty.push_back(&mut set.slots, id.index());
        }
        host.on_frame_popped(id)?;
        Ok(Some(frame))
    }

    pub fn subscribe(&mut self, id: SocketId, events: Events) {
        self.update_masks(id, |subscribed, pending| (subscribed | events, pending));
    }

    pub fn unsubscribe(&mut self, id: SocketId, events: Events) {
        self.update_masks(id, |subscribed, pending| (subscribed - events, pending));
    }

    pub fn add_pending(&mut self, id: SocketId, events: Events) {
        self.update_masks(id, |subscribed, pending| (subscribed, pending | events));
    }

    pub fn remove_pending(&mut self, id: SocketId, events: Events) {
        self.update_masks(id, |subscribed, pending| (subscribed, pending - events));
    }

    fn update_masks(&mut self, id: SocketId, f: impl FnOnce(Events, Events) -> (Events, Events)) {
        let Some(socket) = self.get_mut(id) else {
            return;
        };
        let was_eligible = socket.subscribed.intersects(socket.pending);
        (socket.subscribed, socket.pending) = f(socket.subscribed, socket.pending);
        let eligible = socket.subscribed.intersects(socket.pending);
        match (was_eligible, eligible) {
            (false, true) => self.callbacks.push_back(&mut self.slots, id.index()),
            (true, false) => self.callbacks.unlink(&mut self.slots, id.index()),
            _ => {}
        }
    }

    /// Invoke the callback of every socket with overlapping subscribed and pending events.
    ///
    /// The eligible sockets and their event masks are captured up front: mask changes made by a
    /// callback affect the next dispatch, not sockets still waiting in this one. Sockets destroyed
    /// before their turn are skipped. The first callback error aborts the pass and is returned.
    pub fn dispatch(host: &mut H) -> Result<()> {
        let worklist: Vec<(SocketId, Events)> = {
            let set = host.socket_set();
            if set.dispatching {
                return Err(Error::Reentrant("SocketSet::dispatch"));
            }
            set.dispatching = true;
            set.callbacks
                .iter(&set.slots)
                .map(|key| {
                    let slot = &set.slots[key];
                    (slot.id(key), slot.socket.subscribed & slot.socket.pending)
                })
                .collect()
        };

        let result = Self::run_callbacks(host, worklist);
        host.socket_set().dispatching = false;
        result
    }

    fn run_callbacks(host: &mut H, worklist: Vec<(SocketId, Events)>) -> Result<()> {
        for (id, events) in worklist {
            // Hold our own reference so the callback outlives a destroy of its socket.
            let Some(callback) = host.socket_set().get(id).map(|s| Rc::clone(&s.callback)) else {
                continue;
            };
            let mut callback = callback
                .try_borrow_mut()
                .map_err(|_| Error::Reentrant("socket callback"))?;
            (*callback)(host, id, events)?;
        }
        Ok(())
    }

    /// Move frames from dirty sockets into the queue `target` selects, one frame per socket per
    /// round, until the target is full or no socket has frames left.
    ///
    /// Frames the target rejects are dropped. A pop-hook error stops the drain and is returned.
    pub fn drain_round_robin(host: &mut H, target: fn(&mut H) -> &mut Queue) -> Result<()> {
        loop {
            if !target(host).has_capacity(1) {
                return Ok(());
            }
            let Some(index) = host.socket_set().dirty.front() else {
                return Ok(());
            };
            let id = host.socket_set().slots[index].id(index);
            let Some(frame) = Self::pop_frame(host, id)? else {
                // Dirty sockets always have frames; unlink defensively to guarantee progress.
                let set = host.socket_set();
                set.dirty.unlink(&mut set.slots, index);
                continue;
            };
            if let Err(frame) = target(host).push(frame) {
                tracing::trace!(len = frame.len(), reason = "send queue full", "dropping frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Host {
        set: SocketSet<Host>,
        out: Queue,
        popped: Vec<SocketId>,
    }

    impl SocketHost for Host {
        type State = ();

        fn socket_set(&mut self) -> &mut SocketSet<Self> {
            &mut self.set
        }

        fn on_frame_popped(&mut self, id: SocketId) -> Result<()> {
            self.popped.push(id);
            Ok(())
        }
    }

    fn host() -> Host {
        Host {
            set: SocketSet::new(),
            out: Queue::new(16),
            popped: Vec::new(),
        }
    }

    fn noop(_: &mut Host, _: SocketId, _: Events) -> Result<()> {
        Ok(())
    }

    #[test]
    fn stale_ids_are_rejected_after_slot_reuse() {
        let mut host = host();
        let a = host.set.insert((), 4, QueuePolicy::Unit, noop);
        assert!(host.set.destroy(a).is_some());
        let b = host.set.insert((), 4, QueuePolicy::Unit, noop);

        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!host.set.contains(a));
        assert!(host.set.contains(b));
        assert!(host.set.destroy(a).is_none());
        assert_eq!(host.set.len(), 1);
        assert!(host.set.send_frame(a, Frame::zeroed(1)).is_err());
    }

    #[test]
    fn callback_list_tracks_mask_overlap() {
        let mut host = host();
        let id = host.set.insert((), 4, QueuePolicy::Unit, noop);

        host.set.subscribe(id, Events::SEND);
        assert_eq!(host.set.callback_len(), 0);
        host.set.add_pending(id, Events::SEND | Events::READ);
        assert_eq!(host.set.callback_len(), 1);
        host.set.add_pending(id, Events::READ);
        assert_eq!(host.set.callback_len(), 1);
        host.set.unsubscribe(id, Events::SEND);
        assert_eq!(host.set.callback_len(), 0);

        host.set.subscribe(id, Events::READ);
        assert_eq!(host.set.callback_len(), 1);
        host.set.destroy(id);
        assert_eq!(host.set.callback_len(), 0);
    }

    #[test]
    fn dirty_list_tracks_queued_frames() {
        let mut host = host();
        let id = host.set.insert((), 2, QueuePolicy::Unit, noop);

        host.set.send_frame(id, Frame::from_bytes(b"a")).unwrap();
        host.set.send_frame(id, Frame::from_bytes(b"b")).unwrap();
        assert!(host.set.send_frame(id, Frame::from_bytes(b"c")).is_err());
        assert_eq!(host.set.dirty_len(), 1);
        assert!(!host.set.has_capacity(id, 1));

        assert_eq!(SocketSet::pop_frame(&mut host, id).unwrap().unwrap(), "a");
        assert_eq!(host.set.dirty_len(), 1);
        assert_eq!(SocketSet::pop_frame(&mut host, id).unwrap().unwrap(), "b");
        assert_eq!(host.set.dirty_len(), 0);
        assert!(SocketSet::pop_frame(&mut host, id).unwrap().is_none());
        assert_eq!(host.popped, [id, id]);
    }

    #[test]
    fn drain_drops_frames_the_target_rejects() {
        let mut host = host();
        host.out = Queue::with_policy(4, QueuePolicy::ByDataLength);
        let id = host.set.insert((), 8, QueuePolicy::Unit, noop);
        host.set.send_frame(id, Frame::from_bytes(b"12345")).unwrap();
        host.set.send_frame(id, Frame::from_bytes(b"12")).unwrap();

        SocketSet::drain_round_robin(&mut host, |h| &mut h.out).unwrap();
        assert_eq!(host.out.pop().unwrap(), "12");
        assert!(host.out.is_empty());
        assert_eq!(host.set.dirty_len(), 0);
    }

    #[test]
    fn dispatch_is_not_reentrant() {
        let mut host = host();
        let seen = Rc::new(RefCell::new(None));
        let seen_in_cb = Rc::clone(&seen);
        let id = host.set.insert((), 4, QueuePolicy::Unit, move |h: &mut Host, _, _| {
            *seen_in_cb.borrow_mut() = Some(SocketSet::dispatch(h).is_err());
            Ok(())
        });
        host.set.subscribe(id, Events::READ);
        host.set.add_pending(id, Events::READ);

        SocketSet::dispatch(&mut host).unwrap();
        assert_eq!(*seen.borrow(), Some(true));
        assert!(!host.set.dispatching);
    }

    #[test]
    fn clear_destroys_everything() {
        let mut host = host();
        for _ in 0..3 {
            let id = host.set.insert((), 4, QueuePolicy::Unit, noop);
            host.set.send_frame(id, Frame::zeroed(1)).unwrap();
        }
        host.set.clear();
        assert!(host.set.is_empty());
        assert_eq!(host.set.dirty_len(), 0);
        assert_eq!(host.set.ids().count(), 0);
    }
}
