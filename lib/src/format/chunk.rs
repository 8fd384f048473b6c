use std::{
    io::{Seek, SeekFrom, Write},
    mem::size_of,
};

use anyhow::{ensure, Result};
use zerocopy::{AsBytes, ByteOrder, FromBytes, FromZeroes, I64, U32};

use crate::format::{error::FormError, FourCC};

pub const CHUNK_DESCRIPTOR_SIZE: u64 = size_of::<ChunkDescriptor<zerocopy::BigEndian>>() as u64;

/// Chunk header. Both `size` and `skip` are relative to the end of the
/// descriptor: the payload starts `skip` bytes in, the next descriptor
/// follows `size` bytes in.
#[derive(Clone, Debug, Default, PartialEq, FromBytes, FromZeroes, AsBytes)]
#[repr(C, packed)]
pub struct ChunkDescriptor<O: ByteOrder> {
    pub id: FourCC,
    pub size: I64<O>,
    pub unk: U32<O>,
    pub skip: I64<O>,
}

impl<O: ByteOrder> ChunkDescriptor<O> {
    pub fn new(id: FourCC, skip: i64) -> Self {
        Self { id, size: I64::ZERO, unk: U32::ZERO, skip: I64::new(skip) }
    }

    /// Payload offset and chunk size, checked so that the payload starts
    /// within the chunk (`0 <= skip <= size`).
    pub fn layout(&self) -> Result<(u64, u64)> {
        let (size, skip) = (self.size.get(), self.skip.get());
        ensure!(
            skip >= 0 && skip <= size,
            "Invalid chunk {:?} layout: offset {skip:#X}, size {size:#X}",
            self.id
        );
        Ok((skip as u64, size as u64))
    }

    pub fn slice(data: &[u8]) -> Result<(&Self, &[u8], &[u8])> {
        let Some(header) = Self::ref_from_prefix(data) else {
            return Err(FormError::truncated(0, CHUNK_DESCRIPTOR_SIZE, data.len() as u64).into());
        };
        let (skip, size) = header.layout()?;
        let base = size_of::<Self>();
        let end = base as u64 + size;
        if end > data.len() as u64 {
            return Err(FormError::truncated(base as u64, size, data.len() as u64).into());
        }
        let start = base + skip as usize;
        let end = end as usize;
        Ok((header, &data[start..end], &data[end..]))
    }

    pub fn write<W, CB>(&self, w: &mut W, mut cb: CB) -> Result<()>
    where
        W: Write + Seek,
        CB: FnMut(&mut W) -> Result<()>,
    {
        let skip = self.skip.get();
        ensure!(skip >= 0, "Invalid chunk {:?} data offset {skip:#X}", self.id);

        // Skip over the header and any leading padding
        let chunk_pos = w.stream_position()?;
        let base_pos = chunk_pos + size_of::<Self>() as u64;
        let data_pos = base_pos + skip as u64;
        if w.seek(SeekFrom::End(0))? < data_pos {
            // Materialise the gap so the payload offset holds in the output
            w.seek(SeekFrom::Start(data_pos - 1))?;
            w.write_all(&[0])?;
        }
        w.seek(SeekFrom::Start(data_pos))?;

        // Write the data and determine the size
        cb(w)?;
        let end_pos = w.stream_position()?;

        // Return to the start of the chunk and write the header
        w.seek(SeekFrom::Start(chunk_pos))?;
        let mut out = self.clone();
        out.size.set((end_pos - base_pos) as i64);
        w.write_all(out.as_bytes())?;

        // Seek to the end
        w.seek(SeekFrom::Start(end_pos))?;
        Ok(())
    }
}
