//! # Data Stream
//!
//! This module exposes the data stream where bytes must be written to/read from

use std::io::{ErrorKind, Read, Result, Write};
use std::net::TcpStream;

/// Size of the chunks read from the source of a transfer
pub const CHUNK_SIZE: usize = 4096;

/// Data connection opened for exactly one LIST, STOR or RETR transfer.
///
/// The server reports the end of a transfer only once the connection is closed,
/// which happens when the stream is dropped.
#[derive(Debug)]
pub struct DataStream {
    stream: TcpStream,
}

impl DataStream {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Returns a reference to the underlying TcpStream.
    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }
}

impl Read for DataStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for DataStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()
    }
}

/// Copy `reader` into `writer` reading at most [`CHUNK_SIZE`] bytes at a time,
/// until a zero-length read. Returns the amount of copied bytes.
pub(crate) fn copy_chunked<R, W>(reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;
    loop {
        let len = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..len])?;
        copied += len as u64;
    }
    writer.flush()?;
    Ok(copied)
}
