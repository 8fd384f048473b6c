use std::{
    io::{Read, Seek, SeekFrom},
    ops::Range,
};

use anyhow::{ensure, Context, Result};
use serde_derive::Serialize;
use zerocopy::BigEndian;

use crate::{
    format::{
        chunk::{ChunkDescriptor, CHUNK_DESCRIPTOR_SIZE},
        error::FormError,
        foot::{self, Metadata},
        handler::{AssetHandler, ChunkReader},
        registry::TypeRegistry,
        rfrm::{FormDescriptor, K_CHUNK_RFRM},
        ByteOrderExt, FourCC,
    },
    util::{read::read_from, seek::PositionGuard},
};

/// Byte order of every fixed-width field in a form.
pub type FormEndian = BigEndian;

/// A chunk dispatched during a load.
#[derive(Debug)]
pub struct Chunk {
    pub desc: ChunkDescriptor<FormEndian>,
    /// Absolute offset of the descriptor.
    pub position: u64,
    pub handler: Box<dyn AssetHandler>,
}

impl Chunk {
    #[inline]
    pub fn id(&self) -> FourCC { self.desc.id }

    /// Absolute offset just past the descriptor; `size` and `skip` are relative to it.
    #[inline]
    pub fn base(&self) -> u64 { self.position + CHUNK_DESCRIPTOR_SIZE }

    /// Absolute offset of the next descriptor.
    #[inline]
    pub fn next(&self) -> u64 { self.base() + self.desc.size.get() as u64 }

    #[inline]
    pub fn payload(&self) -> Range<u64> {
        self.base().saturating_add_signed(self.desc.skip.get())..self.next()
    }
}

/// Everything read between the form descriptor and the effective end.
#[derive(Debug, Default)]
pub struct FormBody {
    pub chunks: Vec<Chunk>,
    /// Nested forms, in file order.
    pub forms: Vec<Form>,
    pub metadata: Option<Metadata>,
    /// Where the chunk loop stopped.
    pub end: u64,
}

impl FormBody {
    pub fn find(&self, id: FourCC) -> Option<&Chunk> { self.chunks.iter().find(|c| c.id() == id) }

    /// The footer metadata handler, if it is a `T`.
    pub fn metadata_as<T: AssetHandler>(&self) -> Option<&T> {
        self.metadata.as_ref().and_then(|m| m.handler.downcast_ref::<T>())
    }
}

#[derive(Debug)]
pub struct Form {
    pub header: FormDescriptor<FormEndian>,
    /// Absolute offset of the form descriptor.
    pub position: u64,
    pub handler: Box<dyn AssetHandler>,
    pub body: FormBody,
}

impl Form {
    #[inline]
    pub fn id(&self) -> FourCC { self.header.id }

    /// Loads a form from the current position to the end of the stream.
    ///
    /// A trailing metadata footer, if present, is decoded and excluded from
    /// the chunk loop.
    pub fn read<R: Read + Seek>(reader: &mut R, registry: &TypeRegistry) -> Result<Self> {
        let position = reader.stream_position()?;
        let header = FormDescriptor::<FormEndian>::read(reader)?;
        let (end, metadata) = foot::locate_end::<FormEndian, R>(reader, registry)?;
        let Some(declared_end) = header.body_end(position) else {
            return Err(FormError::truncated(position, header.size.get(), end).into());
        };
        if declared_end != end {
            log::warn!(
                "{:?} declares data up to {declared_end:#X}, stream data ends at {end:#X}",
                header.id
            );
        }
        Self::read_body(reader, registry, header, position, end, metadata)
    }

    fn read_nested<R>(reader: &mut R, registry: &TypeRegistry, limit: u64) -> Result<Self>
    where R: Read + Seek {
        let position = reader.stream_position()?;
        let header = FormDescriptor::<FormEndian>::read(reader)?;
        let end = match header.body_end(position) {
            Some(end) if end <= limit => end,
            _ => return Err(FormError::truncated(position, header.size.get(), limit).into()),
        };
        Self::read_body(reader, registry, header, position, end, None)
    }

    fn read_body<R: Read + Seek>(
        reader: &mut R,
        registry: &TypeRegistry,
        header: FormDescriptor<FormEndian>,
        position: u64,
        end: u64,
        metadata: Option<Metadata>,
    ) -> Result<Self> {
        log::debug!("Reading {:?} form at {position:#X}", header.id);
        let mut body = FormBody { metadata, end, ..Default::default() };
        loop {
            let pos = reader.stream_position()?;
            if pos >= end {
                break;
            }
            if end - pos < 4 {
                return Err(FormError::truncated(pos, CHUNK_DESCRIPTOR_SIZE, end).into());
            }
            if peek_magic(reader)? == K_CHUNK_RFRM {
                let form = Self::read_nested(reader, registry, end)?;
                ensure!(
                    form.body.end > pos,
                    "Nested {:?} form at {pos:#X} does not advance",
                    form.id()
                );
                reader.seek(SeekFrom::Start(form.body.end))?;
                body.forms.push(form);
            } else {
                body.chunks.push(read_chunk(reader, registry, end)?);
            }
        }

        let mut handler = registry.create(header.id);
        handler
            .after_load(&body)
            .with_context(|| format!("Failed to finish loading {:?} form", header.id))?;
        Ok(Self { header, position, handler, body })
    }

    pub fn summary(&self) -> FormSummary {
        FormSummary {
            id: self.id(),
            position: self.position,
            size: self.header.size.get(),
            reader_version: self.header.reader_version.get(),
            writer_version: self.header.writer_version.get(),
            end: self.body.end,
            handler: self.handler.name(),
            chunks: self
                .body
                .chunks
                .iter()
                .map(|c| ChunkSummary {
                    id: c.id(),
                    position: c.position,
                    size: c.desc.size.get(),
                    offset: c.desc.skip.get(),
                    handler: c.handler.name(),
                })
                .collect(),
            forms: self.body.forms.iter().map(Self::summary).collect(),
            metadata: self.body.metadata.as_ref().map(|m| MetadataSummary {
                kind: m.kind,
                offset: m.offset,
                len: m.len,
                handler: m.handler.name(),
            }),
        }
    }
}

fn peek_magic<R: Read + Seek>(reader: &mut R) -> Result<FourCC> {
    let mut guard = PositionGuard::new(reader)?;
    Ok(read_from(&mut *guard)?)
}

fn read_chunk<R: Read + Seek>(reader: &mut R, registry: &TypeRegistry, end: u64) -> Result<Chunk> {
    let position = reader.stream_position()?;
    if end - position < CHUNK_DESCRIPTOR_SIZE {
        return Err(FormError::truncated(position, CHUNK_DESCRIPTOR_SIZE, end).into());
    }
    let desc: ChunkDescriptor<FormEndian> = read_from(reader)?;
    let base = position + CHUNK_DESCRIPTOR_SIZE;
    let (skip, size) =
        desc.layout().with_context(|| format!("Failed to read chunk at {position:#X}"))?;
    let next = match base.checked_add(size) {
        Some(next) if next <= end => next,
        _ => return Err(FormError::truncated(base, size, end).into()),
    };
    let start = base + skip;

    let mut handler = registry.create(desc.id);
    log::debug!(
        "Chunk {:?} at {position:#X}: data {start:#X}-{next:#X} ({})",
        desc.id,
        handler.name()
    );
    reader.seek(SeekFrom::Start(start))?;
    handler
        .read_body(
            &mut ChunkReader::new(reader, start, next - start),
            FormEndian::ENDIAN,
        )
        .with_context(|| format!("Failed to read {:?} chunk at {position:#X}", desc.id))?;
    // Handlers may leave the stream anywhere
    reader.seek(SeekFrom::Start(next))?;
    Ok(Chunk { desc, position, handler })
}

#[derive(Clone, Debug, Serialize)]
pub struct ChunkSummary {
    pub id: FourCC,
    pub position: u64,
    pub size: i64,
    pub offset: i64,
    pub handler: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetadataSummary {
    pub kind: FourCC,
    pub offset: u64,
    pub len: u64,
    pub handler: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct FormSummary {
    pub id: FourCC,
    pub position: u64,
    pub size: u64,
    pub reader_version: u32,
    pub writer_version: u32,
    pub end: u64,
    pub handler: &'static str,
    pub chunks: Vec<ChunkSummary>,
    pub forms: Vec<FormSummary>,
    pub metadata: Option<MetadataSummary>,
}
