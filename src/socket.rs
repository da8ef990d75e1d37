//! Object-mode framing over a duplex TCP connection.
//!
//! One encoder writes into an internal buffer that is flushed to the
//! connection in a single write; one decoder reads through a buffered
//! handle of the same connection. The two directions are guarded by
//! independent locks, so one thread may block in [`Socket::read`] while
//! another writes.

use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::error::{PackError, Result};
use crate::options::Options;
use crate::packer::{Pack, Packer};
use crate::record::AnyRecord;
use crate::unpacker::Unpacker;

pub struct Socket {
    conn: TcpStream,
    write_half: Mutex<WriteHalf>,
    read_half: Mutex<ReadHalf>,
}

struct WriteHalf {
    packer: Packer,
    buffer: Vec<u8>,
    /// Bytes actually handed to the connection. An encode error before the
    /// flush leaves this untouched, which is why it can lag behind the
    /// packer's own counter.
    written: u64,
}

struct ReadHalf {
    unpacker: Unpacker,
    stream: BufReader<TcpStream>,
}

impl Socket {
    /// Wraps an already-connected stream. The options must carry a
    /// registry: framing is only defined in object mode, where each value
    /// announces its type id.
    pub fn new(conn: TcpStream, options: Options) -> Result<Socket> {
        if options.registry.is_none() {
            return Err(PackError::RegistryRequired);
        }

        let read_stream = conn.try_clone()?;
        debug!("codec socket established; peer: {:?}", conn.peer_addr().ok());

        Ok(Socket {
            conn,
            write_half: Mutex::new(WriteHalf {
                packer: Packer::new(options.clone()),
                buffer: Vec::new(),
                written: 0,
            }),
            read_half: Mutex::new(ReadHalf {
                unpacker: Unpacker::new(options),
                stream: BufReader::new(read_stream),
            }),
        })
    }

    /// Writes one object, blocking without a deadline.
    pub fn write<T: Pack>(&self, data: &T) -> Result<()> {
        let mut half = self.write_half.lock();
        self.conn.set_write_timeout(None)?;
        self.write_locked(&mut half, data)
    }

    /// Writes one object with a deadline on the connection. A zero
    /// timeout clears any prior deadline.
    pub fn write_timeout<T: Pack>(&self, data: &T, timeout: Duration) -> Result<()> {
        let mut half = self.write_half.lock();
        self.conn.set_write_timeout(non_zero(timeout))?;
        self.write_locked(&mut half, data)
    }

    /// Reads one object, blocking without a deadline.
    pub fn read(&self) -> Result<AnyRecord> {
        let mut half = self.read_half.lock();
        self.conn.set_read_timeout(None)?;
        Self::read_locked(&mut half)
    }

    /// Reads one object with a deadline on the connection. A zero timeout
    /// clears any prior deadline.
    pub fn read_timeout(&self, timeout: Duration) -> Result<AnyRecord> {
        let mut half = self.read_half.lock();
        self.conn.set_read_timeout(non_zero(timeout))?;
        Self::read_locked(&mut half)
    }

    pub fn close(&self) -> Result<()> {
        self.conn.shutdown(Shutdown::Both)?;
        Ok(())
    }

    pub fn bytes_read(&self) -> u64 {
        self.read_half.lock().unpacker.bytes_read()
    }

    pub fn bytes_written(&self) -> u64 {
        self.write_half.lock().written
    }

    pub fn reset_read(&self) {
        self.read_half.lock().unpacker.reset_counter();
    }

    pub fn reset_written(&self) {
        let mut half = self.write_half.lock();
        half.written = 0;
        half.packer.reset_counter();
    }

    /// Discards the internal write buffer to release its memory.
    pub fn zero_buffer(&self) {
        self.write_half.lock().buffer = Vec::new();
    }

    fn write_locked<T: Pack>(&self, half: &mut WriteHalf, data: &T) -> Result<()> {
        half.buffer.clear();
        let WriteHalf { packer, buffer, .. } = half;
        packer.encode(buffer, data)?;

        (&self.conn).write_all(&half.buffer)?;
        half.written += half.buffer.len() as u64;
        trace!("wrote frame; bytes: {}", half.buffer.len());
        Ok(())
    }

    fn read_locked(half: &mut ReadHalf) -> Result<AnyRecord> {
        let ReadHalf { unpacker, stream } = half;
        let record = unpacker.decode::<AnyRecord>(stream)?;
        trace!("read frame; type: {}", record.type_name());
        Ok(record)
    }
}

/// `set_read_timeout`/`set_write_timeout` treat `Some(0)` as an error;
/// a zero deadline here means "no deadline".
fn non_zero(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}
