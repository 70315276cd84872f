//! Transport layer abstraction
//!
//! Both the control channel and the streaming client talk to the module
//! through this trait. Concrete bindings live in the `bt122-ota-serial` and
//! `bt122-ota-rfcomm` crates; the in-memory emulator lives in
//! `bt122-ota-dummy`.

use crate::error::{OtaError, Result};

/// Byte stream to the remote module
pub trait Transport {
    /// Write all bytes to the transport
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever is available into `buf`
    ///
    /// Returns the number of bytes read. `Ok(0)` means the peer closed the
    /// stream. Implementations return [`OtaError::Timeout`] when nothing
    /// arrives within their configured timeout.
    fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the underlying connection
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Short human readable description of the peer
    fn describe(&self) -> String {
        String::from("transport")
    }

    /// Read exactly `buf.len()` bytes
    ///
    /// Loops over [`Transport::recv_some`] until the buffer is full. A closure
    /// or timeout after some bytes arrived is reported as
    /// [`OtaError::ShortRead`]; a timeout before the first byte stays
    /// [`OtaError::Timeout`].
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let expected = buf.len();
        let mut filled = 0;
        while filled < expected {
            match self.recv_some(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(OtaError::ShortRead {
                        expected,
                        received: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(OtaError::Timeout) if filled > 0 => {
                    return Err(OtaError::ShortRead {
                        expected,
                        received: filled,
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Read exactly `len` bytes into a new buffer
    fn recv(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.recv_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv_some(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv_some(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Boxed transport as handed out by the session
pub type BoxedTransport = Box<dyn Transport>;


#[cfg(test)]
mod tests {
    use super::mock::ScriptedTransport;
    use super::*;

    #[test]
    fn test_recv_exact_accumulates_partial_reads() {
        let mut t = ScriptedTransport::new();
        t.reply(&[1, 2, 3, 4, 5, 6, 7]);
        t.max_read = Some(2);
        let data = t.recv(7).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_recv_exact_reports_short_read_on_close() {
        let mut t = ScriptedTransport::new();
        t.reply(&[1, 2, 3]);
        t.closed_when_empty = true;
        match t.recv(5) {
            Err(OtaError::ShortRead { expected, received }) => {
                assert_eq!(expected, 5);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_recv_exact_timeout_after_partial_is_short_read() {
        let mut t = ScriptedTransport::new();
        t.reply(&[9]);
        assert!(matches!(
            t.recv(2),
            Err(OtaError::ShortRead {
                expected: 2,
                received: 1
            })
        ));
    }

    #[test]
    fn test_recv_exact_timeout_without_data() {
        let mut t = ScriptedTransport::new();
        assert!(matches!(t.recv(1), Err(OtaError::Timeout)));
    }

    #[test]
    fn test_zero_length_recv_does_not_touch_transport() {
        let mut t = ScriptedTransport::new();
        assert!(t.recv(0).unwrap().is_empty());
    }

    #[test]
    fn test_boxed_transport_forwards() {
        let mut boxed: BoxedTransport = Box::new(ScriptedTransport::new());
        boxed.send(&[0xAB]).unwrap();
        assert!(matches!(boxed.recv(1), Err(OtaError::Timeout)));
    }
}
