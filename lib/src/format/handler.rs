use std::{
    any::Any,
    fmt::Debug,
    io,
    io::{Cursor, Read, Seek, SeekFrom, Write},
};

use anyhow::Result;
use binrw::Endian;

use crate::{format::form::FormBody, util::read::read_vec};

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// A view of the stream positioned at a chunk (or metadata) payload.
///
/// The bound is advisory: reads and seeks pass straight through to the
/// underlying stream, and the caller re-seeks once the handler returns.
pub struct ChunkReader<'a> {
    inner: &'a mut dyn ReadSeek,
    start: u64,
    len: u64,
}

impl<'a> ChunkReader<'a> {
    pub fn new(inner: &'a mut dyn ReadSeek, start: u64, len: u64) -> Self {
        Self { inner, start, len }
    }

    /// Absolute offset of the payload.
    #[inline]
    pub fn start(&self) -> u64 { self.start }

    #[inline]
    pub fn len(&self) -> u64 { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Absolute offset one past the payload.
    #[inline]
    pub fn end(&self) -> u64 { self.start + self.len }

    /// Bytes left between the current position and the end of the payload.
    pub fn remaining(&mut self) -> io::Result<u64> {
        let pos = self.inner.stream_position()?;
        Ok(self.end().saturating_sub(pos))
    }

    /// Reads everything up to the end of the payload.
    pub fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        let remaining = self.remaining()?;
        read_vec(self, remaining as usize)
    }
}

impl Read for ChunkReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { self.inner.read(buf) }
}

impl Seek for ChunkReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> { self.inner.seek(pos) }
}

/// Per-type behaviour selected through the
/// [`TypeRegistry`](crate::format::registry::TypeRegistry).
///
/// One handler instance is created per dispatch: per chunk body, per
/// metadata block, and per form (for [`after_load`](Self::after_load)).
pub trait AssetHandler: Any + Debug + Send {
    /// Short name for logs and summaries.
    fn name(&self) -> &'static str;

    fn read_body(&mut self, _reader: &mut ChunkReader, _e: Endian) -> Result<()> { Ok(()) }

    fn read_metadata(&mut self, _reader: &mut ChunkReader, _e: Endian) -> Result<()> { Ok(()) }

    fn write_metadata(&self, _w: &mut Cursor<Vec<u8>>, _e: Endian) -> Result<()> { Ok(()) }

    /// Runs once every chunk of the form has been dispatched.
    fn after_load(&mut self, _body: &FormBody) -> Result<()> { Ok(()) }

    fn as_any(&self) -> &dyn Any;
}

impl dyn AssetHandler {
    #[inline]
    pub fn downcast_ref<T: AssetHandler>(&self) -> Option<&T> { self.as_any().downcast_ref() }
}

pub type HandlerFactory = fn() -> Box<dyn AssetHandler>;

/// Fallback for type codes without a registered handler.
///
/// Chunk bodies are skipped; metadata is carried as opaque bytes so that it
/// can be written back unchanged.
#[derive(Debug, Default)]
pub struct InertHandler {
    pub metadata: Vec<u8>,
}

impl InertHandler {
    pub fn create() -> Box<dyn AssetHandler> { Box::<Self>::default() }
}

impl AssetHandler for InertHandler {
    fn name(&self) -> &'static str { "inert" }

    fn read_metadata(&mut self, reader: &mut ChunkReader, _e: Endian) -> Result<()> {
        self.metadata = reader.read_remaining()?;
        Ok(())
    }

    fn write_metadata(&self, w: &mut Cursor<Vec<u8>>, _e: Endian) -> Result<()> {
        w.write_all(&self.metadata)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any { self }
}
