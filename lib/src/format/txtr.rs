use std::{any::Any, io::Cursor, ops::Range};

use anyhow::{anyhow, ensure, Result};
use binrw::{binrw, BinReaderExt, BinWriterExt, Endian};

use crate::format::{
    form::FormBody,
    handler::{AssetHandler, ChunkReader},
    FourCC,
};

// Texture
pub const K_FORM_TXTR: FourCC = FourCC(*b"TXTR");

#[binrw]
#[derive(Clone, Debug, PartialEq)]
pub struct STextureReadInfo {
    pub index: u8,
    pub offset: u32,
    pub size: u32,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct STextureCompressedBufferInfo2 {
    pub first_index: u32,
    pub first_size: u32,
    pub first_dest_offset: u32,
    pub first_dest_size: u32,
    pub unk: u32,
    pub second_index: u32,
    pub second_size: u32,
    pub second_dest_offset: u32,
    pub second_dest_size: u32,
    // Within the second buffer, part of the data may be uncompressed.
    pub second_decompressed_len: u32,
    pub second_compressed_len: u32,
    pub second_compressed_offset: u32,
}

#[binrw]
#[derive(Clone, Debug, PartialEq)]
pub struct STextureMetaData {
    pub unk1: u32,
    pub unk2: u32,
    pub alloc_category: u32,
    pub gpu_offset: u32,
    pub align: u32,
    pub decompressed_size: u32,
    #[bw(try_calc = info.len().try_into())]
    pub info_count: u32,
    #[br(count = info_count)]
    pub info: Vec<STextureReadInfo>,
    pub buffers: STextureCompressedBufferInfo2,
}

impl STextureMetaData {
    /// Checks read ranges against the primary data and destination ranges
    /// against the decompressed size.
    pub fn validate(&self, data_end: u64) -> Result<()> {
        for read in &self.info {
            let end = read.offset as u64 + read.size as u64;
            ensure!(
                end <= data_end,
                "Read buffer {} ({:#X}-{end:#X}) extends past end of data ({data_end:#X})",
                read.index,
                read.offset
            );
        }
        let buffers = &self.buffers;
        for (name, index, size, dest_offset, dest_size) in [
            (
                "first",
                buffers.first_index,
                buffers.first_size,
                buffers.first_dest_offset,
                buffers.first_dest_size,
            ),
            (
                "second",
                buffers.second_index,
                buffers.second_size,
                buffers.second_dest_offset,
                buffers.second_dest_size,
            ),
        ] {
            if size == 0 {
                continue;
            }
            let read = self
                .info
                .get(index as usize)
                .ok_or_else(|| anyhow!("Failed to locate read info for {name} buffer {index}"))?;
            ensure!(
                size <= read.size,
                "{name} buffer size {size:#X} exceeds read buffer {index} ({:#X})",
                read.size
            );
            let dest_end = dest_offset as u64 + dest_size as u64;
            ensure!(
                dest_end <= self.decompressed_size as u64,
                "{name} buffer destination {dest_offset:#X}-{dest_end:#X} exceeds decompressed size {:#X}",
                self.decompressed_size
            );
        }
        Ok(())
    }
}

/// Handler for `TXTR`.
#[derive(Debug, Default)]
pub struct TextureHandler {
    /// Payload extent, when dispatched for a chunk.
    pub body: Option<Range<u64>>,
    pub meta: Option<STextureMetaData>,
}

impl TextureHandler {
    pub fn create() -> Box<dyn AssetHandler> { Box::<Self>::default() }
}

impl AssetHandler for TextureHandler {
    fn name(&self) -> &'static str { "texture" }

    fn read_body(&mut self, reader: &mut ChunkReader, _e: Endian) -> Result<()> {
        self.body = Some(reader.start()..reader.end());
        Ok(())
    }

    fn read_metadata(&mut self, reader: &mut ChunkReader, e: Endian) -> Result<()> {
        self.meta = Some(reader.read_type(e)?);
        Ok(())
    }

    fn write_metadata(&self, w: &mut Cursor<Vec<u8>>, e: Endian) -> Result<()> {
        if let Some(meta) = &self.meta {
            w.write_type(meta, e)?;
        }
        Ok(())
    }

    fn after_load(&mut self, body: &FormBody) -> Result<()> {
        if let Some(meta) = body.metadata_as::<Self>().and_then(|h| h.meta.as_ref()) {
            meta.validate(body.end)?;
            log::debug!(
                "Texture metadata: {} read buffers, decompressed size {:#X}",
                meta.info.len(),
                meta.decompressed_size
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any { self }
}
