//! Budgeted wrappers over the underlying byte streams. A budget of zero
//! disables enforcement; otherwise any transfer that would pass the
//! remaining budget fails with [`PackError::DataTooLarge`], carried through
//! the `io` traits and unwrapped by `From<io::Error> for PackError`.

use std::io::{self, Read, Write};

use crate::error::PackError;

pub struct LimitedWriter<'a> {
    inner: &'a mut dyn Write,
    max: u64,
    remaining: u64,
}

impl<'a> LimitedWriter<'a> {
    pub fn new(inner: &'a mut dyn Write, max: u64) -> Self {
        Self {
            inner,
            max,
            remaining: max,
        }
    }
}

impl Write for LimitedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max == 0 {
            return self.inner.write(buf);
        }

        let len = buf.len() as u64;
        if len > self.remaining {
            let size = self.max - self.remaining + len;
            self.remaining = 0;
            return Err(io::Error::other(PackError::DataTooLarge {
                max: self.max,
                size,
                type_name: None,
            }));
        }

        let n = self.inner.write(buf)?;
        self.remaining -= n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct LimitedReader<'a> {
    inner: &'a mut dyn Read,
    max: u64,
    remaining: u64,
}

impl<'a> LimitedReader<'a> {
    pub fn new(inner: &'a mut dyn Read, max: u64) -> Self {
        Self {
            inner,
            max,
            remaining: max,
        }
    }
}

impl Read for LimitedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.max == 0 {
            return self.inner.read(buf);
        }

        if self.remaining == 0 {
            return Err(io::Error::other(PackError::DataTooLarge {
                max: self.max,
                size: self.max + buf.len() as u64,
                type_name: None,
            }));
        }

        // A request past the budget is truncated to what is left.
        let cap = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.inner.read(&mut buf[..cap])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
