// ## 📂 File: `src/stream/io.rs`
// ## Block reads and the sink abstraction shared by the copy engine

use std::io::{self, ErrorKind, Read, Write};

use bytes::Bytes;

/// Read up to `len` bytes, looping over short reads. Returns fewer than `len`
/// bytes only at EOF; an empty buffer means the source is exhausted.
pub fn read_exact_or_eof<R: Read + ?Sized>(r: &mut R, len: usize) -> io::Result<Bytes> {
    let mut buf = vec![0u8; len];
    let mut off = 0;

    while off < len {
        match r.read(&mut buf[off..]) {
            Ok(0) => break,
            Ok(n) => off += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    buf.truncate(off);
    Ok(Bytes::from(buf))
}

/// Destination of the fan-out copy engine.
///
/// `close` is called once, after the final `flush`, and must release the
/// underlying resource (finalize a cipher stream, close a pipe).
pub trait BlockSink: Send {
    fn write_block(&mut self, block: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

impl<S: BlockSink + ?Sized> BlockSink for Box<S> {
    fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
        (**self).write_block(block)
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapts any `Write` into a `BlockSink`. Closing drops the writer, which is
/// what signals EOF to a child process reading the other end of a pipe.
pub struct WriterSink<W: Write + Send> {
    inner: Option<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: Some(inner) }
    }

    fn writer(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::BrokenPipe, "sink already closed"))
    }
}

impl<W: Write + Send> BlockSink for WriterSink<W> {
    fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(block)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut w) => w.flush(),
            None => Ok(()),
        }
    }
}
