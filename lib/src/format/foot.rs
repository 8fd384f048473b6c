//! Metadata footer.
//!
//! Extracted assets may carry a metadata block (buffer offsets and sizes used
//! for decompression) after their primary data, located by a 12-byte trailer:
//!
//! ```text
//! [primary data][metadata][META][type][size]
//!                ^ stream length - size
//! ```
//!
//! `size` spans the metadata block and the trailer itself, so seeking back
//! `size` bytes from the end of the stream lands on the metadata.

use std::{
    io::{Cursor, Read, Seek, SeekFrom, Write},
    mem::size_of,
};

use anyhow::{ensure, Context, Result};
use zerocopy::{AsBytes, ByteOrder, FromBytes, FromZeroes, U32};

use crate::{
    format::{
        error::FormError,
        handler::{AssetHandler, ChunkReader},
        registry::TypeRegistry,
        ByteOrderExt, FourCC,
    },
    util::{
        read::read_from,
        seek::{stream_len, PositionGuard},
    },
};

// Metadata footer
pub const K_FOOTER_META: FourCC = FourCC(*b"META");

pub const FOOTER_SIZE: u64 = size_of::<MetaFooter<zerocopy::BigEndian>>() as u64;

#[derive(Clone, Debug, PartialEq, FromBytes, FromZeroes, AsBytes)]
#[repr(C, packed)]
pub struct MetaFooter<O: ByteOrder> {
    pub magic: FourCC,
    pub kind: FourCC,
    pub size: U32<O>,
}

/// A footer located at the end of a stream.
///
/// Only [`read_footer`] builds one, after checking `12 <= size <= stream_len`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FooterInfo {
    kind: FourCC,
    size: u32,
    stream_len: u64,
}

impl FooterInfo {
    #[inline]
    pub fn kind(&self) -> FourCC { self.kind }

    /// The footer's size field: metadata block plus trailer.
    #[inline]
    pub fn size(&self) -> u32 { self.size }

    #[inline]
    pub fn stream_len(&self) -> u64 { self.stream_len }

    /// Absolute offset of the metadata block.
    #[inline]
    pub fn metadata_offset(&self) -> u64 { self.stream_len - self.size as u64 }

    #[inline]
    pub fn metadata_len(&self) -> u64 { self.size as u64 - FOOTER_SIZE }

    /// Where primary data stops.
    #[inline]
    pub fn end_offset(&self) -> u64 { self.metadata_offset() }
}

/// A decoded metadata block.
#[derive(Debug)]
pub struct Metadata {
    pub kind: FourCC,
    pub offset: u64,
    pub len: u64,
    pub handler: Box<dyn AssetHandler>,
}

/// Checks for the footer magic at `stream length - 12`.
pub fn has_footer<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<bool> {
    let mut guard = PositionGuard::new(reader)?;
    let len = guard.seek(SeekFrom::End(0))?;
    if len < FOOTER_SIZE {
        return Ok(false);
    }
    guard.seek(SeekFrom::Start(len - FOOTER_SIZE))?;
    let magic: FourCC = read_from(&mut *guard)?;
    Ok(magic == K_FOOTER_META)
}

/// Reads the footer and locates the metadata block.
pub fn read_footer<O, R>(reader: &mut R) -> Result<FooterInfo>
where
    O: ByteOrder,
    R: Read + Seek + ?Sized,
{
    let mut guard = PositionGuard::new(reader)?;
    let stream_len = guard.seek(SeekFrom::End(0))?;
    if stream_len < FOOTER_SIZE {
        return Err(FormError::truncated(0, FOOTER_SIZE, stream_len).into());
    }
    guard.seek(SeekFrom::Start(stream_len - FOOTER_SIZE))?;
    let footer: MetaFooter<O> = read_from(&mut *guard)?;
    ensure!(footer.magic == K_FOOTER_META, "Invalid footer magic {:?}", footer.magic);
    let size = footer.size.get();
    if (size as u64) < FOOTER_SIZE || size as u64 > stream_len {
        return Err(FormError::InvalidFooterSize { size, len: stream_len }.into());
    }
    let info = FooterInfo { kind: footer.kind, size, stream_len };
    // Positioned at the end of the stream; the size leads back to the metadata
    let offset = guard.seek(SeekFrom::Current(-(size as i64)))?;
    debug_assert_eq!(offset, info.metadata_offset());
    Ok(info)
}

/// Decodes the metadata block with the handler registered for its type.
pub fn read_metadata<O, R>(
    reader: &mut R,
    info: &FooterInfo,
    registry: &TypeRegistry,
) -> Result<Metadata>
where
    O: ByteOrderExt,
    R: Read + Seek,
{
    let offset = info.metadata_offset();
    let len = info.metadata_len();
    let mut guard = PositionGuard::new(reader)?;
    guard.seek(SeekFrom::Start(offset))?;
    let mut handler = registry.create(info.kind);
    handler
        .read_metadata(&mut ChunkReader::new(&mut *guard, offset, len), O::ENDIAN)
        .with_context(|| format!("Failed to read {:?} metadata at {offset:#X}", info.kind))?;
    log::debug!("Read {:?} metadata ({len:#X} bytes) with {} handler", info.kind, handler.name());
    Ok(Metadata { kind: info.kind, offset, len, handler })
}

/// Determines where primary data ends, decoding the metadata block if there is one.
pub fn locate_end<O, R>(
    reader: &mut R,
    registry: &TypeRegistry,
) -> Result<(u64, Option<Metadata>)>
where
    O: ByteOrderExt,
    R: Read + Seek,
{
    if !has_footer(reader)? {
        let len = stream_len(reader)?;
        return Ok((len, None));
    }
    let info = read_footer::<O, R>(reader)?;
    let metadata = read_metadata::<O, R>(reader, &info, registry)?;
    Ok((info.end_offset(), Some(metadata)))
}

/// Writes `handler`'s metadata followed by the footer at the current position.
///
/// Returns the footer size field.
pub fn write_footer_with<O, W>(w: &mut W, kind: FourCC, handler: &dyn AssetHandler) -> Result<u32>
where
    O: ByteOrderExt,
    W: Write + Seek,
{
    let mut buf = Cursor::new(Vec::new());
    handler
        .write_metadata(&mut buf, O::ENDIAN)
        .with_context(|| format!("Failed to write {kind:?} metadata"))?;

    let start = w.stream_position()?;
    w.write_all(buf.get_ref())?;
    w.write_all(K_FOOTER_META.as_bytes())?;
    w.write_all(kind.as_bytes())?;
    let written = w.stream_position()? - start;
    // Count the size field itself
    let size = u32::try_from(written + size_of::<U32<O>>() as u64)
        .with_context(|| format!("Metadata too large: {written:#X} bytes"))?;
    w.write_all(U32::<O>::new(size).as_bytes())?;
    Ok(size)
}

/// Re-encodes `metadata` through the handler registered for `kind` and
/// writes it with a footer at `offset`.
///
/// The footer must end the stream, so `offset` is normally the end of the
/// primary data.
pub fn write_footer<O, W>(
    w: &mut W,
    registry: &TypeRegistry,
    kind: FourCC,
    metadata: &[u8],
    offset: u64,
) -> Result<u32>
where
    O: ByteOrderExt,
    W: Write + Seek,
{
    let mut handler = registry.create(kind);
    let mut source = Cursor::new(metadata);
    handler
        .read_metadata(&mut ChunkReader::new(&mut source, 0, metadata.len() as u64), O::ENDIAN)
        .with_context(|| format!("Failed to decode {kind:?} metadata"))?;
    w.seek(SeekFrom::Start(offset))?;
    write_footer_with::<O, W>(w, kind, handler.as_ref())
}

/// Locates a footer at the end of `data`, if any.
pub fn slice_footer<O: ByteOrder>(data: &[u8]) -> Option<&MetaFooter<O>> {
    let footer = MetaFooter::<O>::ref_from_suffix(data)?;
    (footer.magic == K_FOOTER_META).then_some(footer)
}
