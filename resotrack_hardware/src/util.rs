use std::io;
use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Fill `buf` from a non-blocking or short-timeout `read` until it is full or
/// `timeout` expires. Sleeps `poll_interval` between empty reads to avoid spinning.
/// `Ok(0)` from the reader means the far end went away.
pub fn fill_with_deadline(
    mut read: impl FnMut(&mut [u8]) -> io::Result<usize>,
    buf: &mut [u8],
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;
    while filled < buf.len() {
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        match read(&mut buf[filled..]) {
            Ok(0) => return Err(HwError::Disconnected),
            Ok(n) => filled += n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                std::thread::sleep(poll_interval);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
