//! Byte Source Contract

use std::io;
use std::sync::{Condvar, Mutex, PoisonError};

/// A blocking producer of raw sensor bytes.
///
/// `read` follows the `std::io::Read` shape with one refinement:
/// `Ok(0)` is a terminal end-of-stream (including a voluntary stop) and
/// `Err` is a transient condition the caller retries. Implementations
/// must tolerate `stop_request` arriving from another thread while a
/// read is in flight.
pub trait ByteSource: Send + Sync {
    /// Block until at least one byte is available, an unblock is
    /// requested, or a transient error occurs.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Cause a currently-blocked `read` to return `Ok(0)` promptly.
    ///
    /// Idempotent and callable from any thread, repeatedly.
    fn stop_request(&self) -> io::Result<()>;
}

struct MemoryState {
    data: Vec<u8>,
    offset: usize,
    unblock: bool,
}

/// In-memory source: serves a preset byte script, then blocks until a
/// stop request arrives and reports end-of-stream.
///
/// Stands in for real hardware in tests and the fake sensor kind.
pub struct MemoryByteSource {
    state: Mutex<MemoryState>,
    wake: Condvar,
}

impl MemoryByteSource {
    /// Create a source that will serve `data` and then block
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                data,
                offset: 0,
                unblock: false,
            }),
            wake: Condvar::new(),
        }
    }

    /// Source serving an incrementing 0..=255 byte ramp
    pub fn ramp() -> Self {
        Self::new((0..=255).collect())
    }
}

impl ByteSource for MemoryByteSource {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.offset < state.data.len() {
            let n = buf.len().min(state.data.len() - state.offset);
            buf[..n].copy_from_slice(&state.data[state.offset..state.offset + n]);
            state.offset += n;
            return Ok(n);
        }

        // Script exhausted: block until someone asks us to stop.
        let mut state = self
            .wake
            .wait_while(state, |s| !s.unblock)
            .unwrap_or_else(PoisonError::into_inner);
        state.unblock = false;
        Ok(0)
    }

    fn stop_request(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.unblock = true;
        drop(state);
        self.wake.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_serves_script_in_chunks() {
        let source = MemoryByteSource::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[test]
    fn test_stop_request_unblocks_exhausted_source() {
        let source = Arc::new(MemoryByteSource::new(vec![]));
        let reader = {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                source.read(&mut buf).unwrap()
            })
        };

        thread::sleep(Duration::from_millis(50));
        source.stop_request().unwrap();
        assert_eq!(reader.join().unwrap(), 0);
    }

    #[test]
    fn test_ramp_contents() {
        let source = MemoryByteSource::ramp();
        let mut buf = [0u8; 256];
        assert_eq!(source.read(&mut buf).unwrap(), 256);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[255], 255);
    }
}
