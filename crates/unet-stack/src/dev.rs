use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// A non-blocking link-layer device carrying whole Ethernet frames.
///
/// Both `send` and `read` must return `Ok(0)` instead of blocking when the device cannot make
/// progress right now; the stack retries on its next loop iteration.
pub trait Device {
    /// Transmit one frame, returning the number of bytes written (0 if the device is full).
    fn send(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Receive one frame into `buf`, returning its length (0 if nothing is pending).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Largest frame the device accepts or produces, Ethernet header included. Must not be 0.
    fn max_transmission_unit(&self) -> usize;
}

impl<T: Device + ?Sized> Device for Box<T> {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        <T as Device>::send(&mut **self, frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        <T as Device>::read(&mut **self, buf)
    }

    fn max_transmission_unit(&self) -> usize {
        <T as Device>::max_transmission_unit(&**self)
    }
}

impl<T: Device + ?Sized> Device for &mut T {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        <T as Device>::send(&mut **self, frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        <T as Device>::read(&mut **self, buf)
    }

    fn max_transmission_unit(&self) -> usize {
        <T as Device>::max_transmission_unit(&**self)
    }
}

impl<T: Device + ?Sized> Device for Rc<RefCell<T>> {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.borrow_mut().send(frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.borrow_mut().read(buf)
    }

    fn max_transmission_unit(&self) -> usize {
        self.borrow().max_transmission_unit()
    }
}
