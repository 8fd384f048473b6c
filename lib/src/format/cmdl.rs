use std::{any::Any, io::Cursor, ops::Range};

use anyhow::{anyhow, ensure, Result};
use binrw::{binrw, BinReaderExt, BinWriterExt, Endian};

use crate::format::{
    form::FormBody,
    handler::{AssetHandler, ChunkReader},
    FourCC,
};

// Cooked model
pub const K_FORM_CMDL: FourCC = FourCC(*b"CMDL");
pub const K_FORM_SMDL: FourCC = FourCC(*b"SMDL");
pub const K_FORM_WMDL: FourCC = FourCC(*b"WMDL");

#[binrw]
#[derive(Clone, Debug, PartialEq)]
pub struct SModelReadBufferInfo {
    pub size: u32,
    pub offset: u32,
}

#[binrw]
#[derive(Clone, Debug, PartialEq)]
pub struct SModelBufferInfo {
    pub read_index: u32,
    pub offset: u32,
    pub size: u32,
    pub dest_size: u32,
}

/// GPU buffer bookkeeping stored in the metadata block.
///
/// Read buffers are absolute ranges of the file; vertex and index buffers are
/// compressed ranges within a read buffer.
#[binrw]
#[derive(Clone, Debug, PartialEq)]
pub struct SModelMetaData {
    pub unk: u32,
    pub gpu_offset: u32,
    #[bw(try_calc = read_info.len().try_into())]
    pub read_info_count: u32,
    #[br(count = read_info_count)]
    pub read_info: Vec<SModelReadBufferInfo>,
    #[bw(try_calc = vtx_buffer_info.len().try_into())]
    pub vtx_buffer_count: u32,
    #[br(count = vtx_buffer_count)]
    pub vtx_buffer_info: Vec<SModelBufferInfo>,
    #[bw(try_calc = idx_buffer_info.len().try_into())]
    pub idx_info_count: u32,
    #[br(count = idx_info_count)]
    pub idx_buffer_info: Vec<SModelBufferInfo>,
}

impl SModelMetaData {
    /// Checks that every buffer lies within the primary data.
    pub fn validate(&self, data_end: u64) -> Result<()> {
        for (idx, read) in self.read_info.iter().enumerate() {
            let end = read.offset as u64 + read.size as u64;
            ensure!(
                end <= data_end,
                "Read buffer {idx} ({:#X}-{end:#X}) extends past end of data ({data_end:#X})",
                read.offset
            );
        }
        let buffers = self.vtx_buffer_info.iter().map(|b| ("vertex", b));
        let buffers = buffers.chain(self.idx_buffer_info.iter().map(|b| ("index", b)));
        for (kind, info) in buffers {
            let read = self.read_info.get(info.read_index as usize).ok_or_else(|| {
                anyhow!("Failed to locate read info for {kind} buffer {}", info.read_index)
            })?;
            ensure!(
                info.offset as u64 + info.size as u64 <= read.size as u64,
                "{kind} buffer {:#X}+{:#X} exceeds read buffer {} ({:#X})",
                info.offset,
                info.size,
                info.read_index,
                read.size
            );
        }
        Ok(())
    }
}

/// Handler for the model family (`CMDL`, `SMDL`, `WMDL`).
#[derive(Debug, Default)]
pub struct ModelHandler {
    /// Payload extent, when dispatched for a chunk.
    pub body: Option<Range<u64>>,
    pub meta: Option<SModelMetaData>,
    /// Chunk types seen in the form, once loaded.
    pub chunk_ids: Vec<FourCC>,
}

impl ModelHandler {
    pub fn create() -> Box<dyn AssetHandler> { Box::<Self>::default() }
}

impl AssetHandler for ModelHandler {
    fn name(&self) -> &'static str { "model" }

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
        self.chunk_ids = body.chunks.iter().map(|c| c.id()).collect();
        if let Some(meta) = body.metadata_as::<Self>().and_then(|h| h.meta.as_ref()) {
            meta.validate(body.end)?;
            log::debug!(
                "Model buffers: {} read, {} vertex, {} index",
                meta.read_info.len(),
                meta.vtx_buffer_info.len(),
                meta.idx_buffer_info.len()
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any { self }
}
