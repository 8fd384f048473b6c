use std::{
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
};

use anyhow::{bail, Result};
use zerocopy::{AsBytes, ByteOrder, FromBytes, FromZeroes, U32, U64};

use crate::{
    format::{chunk::ChunkDescriptor, error::FormError, foot, peek_four_cc, FourCC},
    util::seek::stream_len,
};

// Resource format
pub const K_CHUNK_RFRM: FourCC = FourCC(*b"RFRM");

pub const FORM_DESCRIPTOR_SIZE: u64 = size_of::<FormDescriptor<zerocopy::BigEndian>>() as u64;

#[derive(Clone, Debug, PartialEq, FromBytes, FromZeroes, AsBytes)]
#[repr(C, packed)]
pub struct FormDescriptor<O: ByteOrder> {
    pub magic: FourCC,
    pub size: U64<O>,
    pub unk: U64<O>,
    pub id: FourCC,
    pub reader_version: U32<O>,
    pub writer_version: U32<O>,
}

impl<O: ByteOrder> FormDescriptor<O> {
    pub fn new(id: FourCC, reader_version: u32, writer_version: u32) -> Self {
        Self {
            magic: K_CHUNK_RFRM,
            size: U64::ZERO,
            unk: U64::ZERO,
            id,
            reader_version: U32::new(reader_version),
            writer_version: U32::new(writer_version),
        }
    }

    /// Reads a descriptor from the current position.
    ///
    /// Reports [`FormError::InvalidMagic`] before looking at anything past the
    /// magic, and [`FormError::TruncatedStream`] if the stream ends early.
    pub fn read<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Self> {
        let pos = reader.stream_position()?;
        let len = stream_len(reader)?;
        let avail = len.saturating_sub(pos).min(FORM_DESCRIPTOR_SIZE) as usize;
        let mut buf = [0u8; FORM_DESCRIPTOR_SIZE as usize];
        reader.read_exact(&mut buf[..avail])?;
        if avail < 4 {
            return Err(FormError::truncated(pos, FORM_DESCRIPTOR_SIZE, len).into());
        }
        let magic = peek_four_cc(&buf);
        if magic != K_CHUNK_RFRM {
            // Leave the stream where the caller had it
            reader.seek(SeekFrom::Start(pos))?;
            return Err(FormError::InvalidMagic { found: magic }.into());
        }
        match Self::read_from(&buf[..avail]) {
            Some(desc) => Ok(desc),
            None => Err(FormError::truncated(pos, FORM_DESCRIPTOR_SIZE, len).into()),
        }
    }

    pub fn slice(data: &[u8]) -> Result<(&Self, &[u8], &[u8])> {
        if data.len() < 4 {
            return Err(FormError::truncated(0, FORM_DESCRIPTOR_SIZE, data.len() as u64).into());
        }
        let magic = peek_four_cc(data);
        if magic != K_CHUNK_RFRM {
            return Err(FormError::InvalidMagic { found: magic }.into());
        }
        let Some(header) = Self::ref_from_prefix(data) else {
            return Err(FormError::truncated(0, FORM_DESCRIPTOR_SIZE, data.len() as u64).into());
        };
        let start = size_of::<Self>();
        let size = header.size.get();
        let end = match usize::try_from(size).ok().and_then(|s| s.checked_add(start)) {
            Some(end) if end <= data.len() => end,
            _ => {
                return Err(FormError::truncated(start as u64, size, data.len() as u64).into());
            }
        };
        Ok((header, &data[start..end], &data[end..]))
    }

    /// Absolute end of the form body, given the offset the descriptor was read at.
    ///
    /// `None` if the declared size runs past the addressable range.
    #[inline]
    pub fn body_end(&self, form_pos: u64) -> Option<u64> {
        form_pos.checked_add(size_of::<Self>() as u64)?.checked_add(self.size.get())
    }

    pub fn write<W, CB>(&self, w: &mut W, mut cb: CB) -> Result<()>
    where
        W: Write + Seek,
        CB: FnMut(&mut W) -> Result<()>,
    {
        // Skip over the header
        let form_pos = w.stream_position()?;
        let data_pos = form_pos + size_of::<Self>() as u64;
        w.seek(SeekFrom::Start(data_pos))?;

        // Write the data and determine the size
        cb(w)?;
        let end_pos = w.stream_position()?;

        // Return to the start of the form and write the header
        w.seek(SeekFrom::Start(form_pos))?;
        let mut out = self.clone();
        out.size.set(end_pos - data_pos);
        w.write_all(out.as_bytes())?;

        // Seek to the end
        w.seek(SeekFrom::Start(end_pos))?;
        Ok(())
    }
}

/// Recursively dump an RFRM + contained chunks
pub fn dump_rfrm<'a, O, W>(w: &mut W, data: &'a [u8], indent: usize) -> Result<&'a [u8]>
where
    O: ByteOrder + 'static,
    W: Write,
{
    let (rfrm, mut rfrm_data, remain) = FormDescriptor::<O>::slice(data)?;
    let indstr = "  ".repeat(indent);
    writeln!(
        w,
        "{indstr}{} (size {:#X}, version {}/{})",
        rfrm.id,
        rfrm.size.get(),
        rfrm.reader_version.get(),
        rfrm.writer_version.get()
    )?;
    while !rfrm_data.is_empty() {
        if rfrm_data.len() >= 4 && peek_four_cc(rfrm_data) == K_CHUNK_RFRM {
            rfrm_data = dump_rfrm::<O, W>(w, rfrm_data, indent + 1)?;
        } else {
            let (desc, payload, remain) = ChunkDescriptor::<O>::slice(rfrm_data)?;
            writeln!(
                w,
                "{indstr}- {} (size {:#X}, offset {:#X}, payload {:#X})",
                desc.id,
                desc.size.get(),
                desc.skip.get(),
                payload.len()
            )?;
            rfrm_data = remain;
        }
    }
    if indent == 0 {
        if let Some(footer) = foot::slice_footer::<O>(remain) {
            writeln!(w, "{indstr}+ {} footer (size {:#X})", footer.kind, footer.size.get())?;
        } else if !remain.is_empty() {
            bail!("{:#X} trailing bytes after form", remain.len());
        }
    }
    Ok(remain)
}
