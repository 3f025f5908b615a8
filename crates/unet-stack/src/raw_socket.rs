use crate::error::{Error, Result};
use crate::event::Events;
use crate::socket::raw::{self, Layer};
use crate::socket::SocketId;
use crate::stack::Stack;

/// Handle to a raw socket opened with [`Stack::open_raw_socket`].
///
/// The handle is a plain id; every operation takes the stack it was opened on. Operations on a
/// closed socket fail with [`Error::SocketClosed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSocket {
    id: SocketId,
}

impl RawSocket {
    pub(crate) fn from_id(id: SocketId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Open a socket on `stack`; shorthand for [`Stack::open_raw_socket`].
    pub fn open(
        stack: &mut Stack,
        layer: Layer,
        callback: impl FnMut(&mut Stack, RawSocket, Events) -> Result<()> + 'static,
    ) -> Result<Self> {
        stack.open_raw_socket(layer, callback)
    }

    /// True until the socket is closed (a closing socket with queued egress counts as closed).
    pub fn is_open(&self, stack: &Stack) -> bool {
        stack
            .socket_set
            .state(self.id)
            .is_some_and(|state| !state.is_closing())
    }

    pub fn layer(&self, stack: &Stack) -> Option<Layer> {
        stack.socket_set.state(self.id).map(|state| state.layer())
    }

    /// Queue one frame (Ethernet layer) or datagram (IPv4 layer). See [`raw::send`].
    pub fn send(&self, stack: &mut Stack, buf: &[u8]) -> Result<usize> {
        let hw_addr = stack.hw_addr;
        raw::send(&mut stack.socket_set, self.id, buf, hw_addr)
    }

    /// Take the oldest received frame or datagram. See [`raw::read`].
    pub fn read(&self, stack: &mut Stack, buf: &mut [u8]) -> Result<usize> {
        raw::read(&mut stack.socket_set, self.id, buf)
    }

    pub fn subscribe(&self, stack: &mut Stack, events: Events) -> Result<()> {
        self.ensure_open(stack)?;
        stack.socket_set.subscribe(self.id, events);
        Ok(())
    }

    pub fn unsubscribe(&self, stack: &mut Stack, events: Events) -> Result<()> {
        self.ensure_open(stack)?;
        stack.socket_set.unsubscribe(self.id, events);
        Ok(())
    }

    /// Close the socket. Frames already queued for sending still go out; the socket is destroyed
    /// once they have.
    pub fn close(self, stack: &mut Stack) {
        stack.close_socket(self.id);
    }

    fn ensure_open(&self, stack: &Stack) -> Result<()> {
        if self.is_open(stack) {
            Ok(())
        } else {
            Err(Error::SocketClosed)
        }
    }
}
