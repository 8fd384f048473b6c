use std::{
    any::Any,
    io::{Cursor, Read, Seek, SeekFrom, Write},
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::{bail, Result};
use binrw::{BinWriterExt, Endian};
use rfrmlib::format::{
    chunk::ChunkDescriptor,
    cmdl::{ModelHandler, SModelBufferInfo, SModelMetaData, SModelReadBufferInfo, K_FORM_CMDL},
    error::FormError,
    foot::{has_footer, read_footer, write_footer},
    form::Form,
    handler::{AssetHandler, ChunkReader, InertHandler},
    registry::TypeRegistry,
    rfrm::{dump_rfrm, FormDescriptor},
    txtr::TextureHandler,
    FourCC,
};
use zerocopy::BigEndian;

fn chunk<W: Write + Seek>(w: &mut W, id: &[u8; 4], skip: i64, payload: &[u8]) -> Result<()> {
    ChunkDescriptor::<BigEndian>::new(FourCC(*id), skip).write(w, |w| Ok(w.write_all(payload)?))
}

fn form<CB>(id: &[u8; 4], cb: CB) -> Vec<u8>
where CB: FnMut(&mut Cursor<Vec<u8>>) -> Result<()> {
    let mut w = Cursor::new(Vec::new());
    FormDescriptor::<BigEndian>::new(FourCC(*id), 1, 1).write(&mut w, cb).unwrap();
    w.into_inner()
}

fn load(data: Vec<u8>, registry: &TypeRegistry) -> Result<(Form, u64)> {
    let mut reader = Cursor::new(data);
    let form = Form::read(&mut reader, registry)?;
    Ok((form, reader.position()))
}

fn form_error(err: &anyhow::Error) -> &FormError {
    err.downcast_ref::<FormError>().unwrap_or_else(|| panic!("not a FormError: {err:?}"))
}

/// Seeks back to the start of the stream and reads from there.
#[derive(Debug, Default)]
struct Wanderer {
    start: u64,
}

impl Wanderer {
    fn create() -> Box<dyn AssetHandler> { Box::<Self>::default() }
}

impl AssetHandler for Wanderer {
    fn name(&self) -> &'static str { "wanderer" }

    fn read_body(&mut self, reader: &mut ChunkReader, _e: Endian) -> Result<()> {
        self.start = reader.stream_position()?;
        reader.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 7];
        reader.read_exact(&mut buf)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any { self }
}

#[test]
fn texture_form_without_footer() {
    let mut data = Vec::new();
    data.extend_from_slice(b"RFRM");
    data.extend_from_slice(&40u64.to_be_bytes());
    data.extend_from_slice(&0u64.to_be_bytes());
    data.extend_from_slice(b"TXTR");
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"TXTR");
    data.extend_from_slice(&16i64.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&0i64.to_be_bytes());
    data.extend((0u8..16).map(|b| b * 3));
    assert_eq!(data.len(), 72);

    let (form, position) = load(data, &TypeRegistry::default()).unwrap();
    assert_eq!(form.id(), *b"TXTR");
    assert_eq!(form.header.size.get(), 40);
    assert_eq!(form.handler.name(), "texture");
    assert_eq!(form.body.end, 72);
    assert_eq!(position, 72);
    assert!(form.body.metadata.is_none());
    assert!(form.body.forms.is_empty());

    assert_eq!(form.body.chunks.len(), 1);
    let chunk = &form.body.chunks[0];
    assert_eq!(chunk.id(), *b"TXTR");
    assert_eq!(chunk.position, 32);
    assert_eq!(chunk.payload(), 56..72);
    let texture = chunk.handler.downcast_ref::<TextureHandler>().unwrap();
    assert_eq!(texture.body, Some(56..72));
}

#[test]
fn rejects_bad_magic_before_reading_chunks() {
    static INVOKED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Counting;

    impl AssetHandler for Counting {
        fn name(&self) -> &'static str { "counting" }

        fn read_body(&mut self, _reader: &mut ChunkReader, _e: Endian) -> Result<()> {
            INVOKED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn as_any(&self) -> &dyn Any { self }
    }

    let mut registry = TypeRegistry::default();
    registry.register(FourCC(*b"CNT "), || Box::new(Counting) as Box<dyn AssetHandler>);

    let mut data = form(b"TXTR", |w| chunk(w, b"CNT ", 0, &[1, 2, 3, 4]));
    // Sanity check: the intact stream does dispatch
    load(data.clone(), &registry).unwrap();
    assert_eq!(INVOKED.swap(0, Ordering::SeqCst), 1);

    data[..4].copy_from_slice(b"FORM");
    let err = load(data, &registry).unwrap_err();
    assert!(matches!(form_error(&err), FormError::InvalidMagic { found } if *found == *b"FORM"));
    assert_eq!(INVOKED.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_chunks_are_skipped() {
    let data = form(b"TXTR", |w| {
        chunk(w, b"SPLN", 0, &[0xFF; 9])?;
        chunk(w, b"HEAD", 4, &[0xEE; 12])?;
        chunk(w, b"TXTR", 0, &[0xDD; 5])
    });
    let (form, position) = load(data, &TypeRegistry::default()).unwrap();
    let ids: Vec<FourCC> = form.body.chunks.iter().map(|c| c.id()).collect();
    assert_eq!(ids, [FourCC(*b"SPLN"), FourCC(*b"HEAD"), FourCC(*b"TXTR")]);
    assert!(form.body.chunks[0].handler.downcast_ref::<InertHandler>().is_some());
    assert!(form.body.chunks[1].handler.downcast_ref::<InertHandler>().is_some());
    assert_eq!(form.body.chunks[2].handler.name(), "texture");
    assert_eq!(form.body.find(FourCC(*b"HEAD")).unwrap().payload(), 93..105);
    assert_eq!(position, form.body.end);
}

#[test]
fn next_chunk_follows_size_regardless_of_handler() {
    let mut registry = TypeRegistry::default();
    registry.register(FourCC(*b"WNDR"), Wanderer::create);

    let data = form(b"CMDL", |w| {
        chunk(w, b"WNDR", 0, &[1; 20])?;
        chunk(w, b"WNDR", 8, &[2; 4])?;
        chunk(w, b"TXTR", 0, &[3; 6])?;
        chunk(w, b"WNDR", 0, &[])
    });
    let len = data.len() as u64;
    let (form, position) = load(data, &registry).unwrap();
    let chunks = &form.body.chunks;
    assert_eq!(chunks.len(), 4);
    for pair in chunks.windows(2) {
        assert_eq!(pair[0].next(), pair[0].base() + pair[0].desc.size.get() as u64);
        assert_eq!(pair[1].position, pair[0].next());
    }
    assert_eq!(chunks[3].next(), len);
    assert_eq!(position, len);

    // Each handler saw the stream at its own payload
    let starts: Vec<u64> = chunks
        .iter()
        .filter_map(|c| c.handler.downcast_ref::<Wanderer>())
        .map(|w| w.start)
        .collect();
    assert_eq!(starts, [chunks[0].payload().start, chunks[1].payload().start, len]);
    assert_eq!(chunks[1].payload(), chunks[1].base() + 8..chunks[1].next());

    let model = form.handler.downcast_ref::<ModelHandler>().unwrap();
    assert_eq!(model.chunk_ids.len(), 4);
}

#[test]
fn handler_errors_propagate() {
    #[derive(Debug)]
    struct Failing;

    impl AssetHandler for Failing {
        fn name(&self) -> &'static str { "failing" }

        fn read_body(&mut self, _reader: &mut ChunkReader, _e: Endian) -> Result<()> {
            bail!("bad payload")
        }

        fn as_any(&self) -> &dyn Any { self }
    }

    let mut registry = TypeRegistry::default();
    registry.register(FourCC(*b"FAIL"), || Box::new(Failing) as Box<dyn AssetHandler>);
    let data = form(b"TXTR", |w| {
        chunk(w, b"TXTR", 0, &[0; 4])?;
        chunk(w, b"FAIL", 0, &[0; 4])
    });
    let err = load(data, &registry).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Failed to read \"FAIL\" chunk at 0x3C"), "{message}");
    assert!(message.contains("bad payload"), "{message}");
}

#[test]
fn truncated_streams() {
    // Chunk claims more data than the stream holds
    let mut data = form(b"TXTR", |w| chunk(w, b"TXTR", 0, &[0; 16]));
    data[36..44].copy_from_slice(&100i64.to_be_bytes());
    let err = load(data, &TypeRegistry::default()).unwrap_err();
    assert!(matches!(
        form_error(&err),
        FormError::TruncatedStream { offset: 56, need: 100, have: 16 }
    ));

    // Partial descriptor
    let mut data = form(b"TXTR", |_| Ok(()));
    data.extend_from_slice(&[0x11; 10]);
    let err = load(data, &TypeRegistry::default()).unwrap_err();
    assert!(matches!(form_error(&err), FormError::TruncatedStream { offset: 32, need: 24, .. }));

    // Partial header
    let err = load(b"RFRM\0\0\0\0\0\0".to_vec(), &TypeRegistry::default()).unwrap_err();
    assert!(matches!(form_error(&err), FormError::TruncatedStream { .. }));
}

#[test]
fn oversized_form_sizes() {
    // Top level: the stream end wins unless the declared end is unrepresentable
    let mut data = form(b"TXTR", |_| Ok(()));
    data[4..12].copy_from_slice(&u64::MAX.to_be_bytes());
    let err = load(data.clone(), &TypeRegistry::default()).unwrap_err();
    assert!(matches!(
        form_error(&err),
        FormError::TruncatedStream { offset: 0, need: u64::MAX, have: 32 }
    ));
    data[4..12].copy_from_slice(&(u64::MAX - 31).to_be_bytes());
    let (form, position) = load(data, &TypeRegistry::default()).unwrap();
    assert_eq!(form.body.end, 32);
    assert_eq!(position, 32);

    // Nested: the declared end must fit inside the parent
    for size in [u64::MAX, u64::MAX - 31] {
        let mut data = crate::form(b"CMDL", |w| {
            FormDescriptor::<BigEndian>::new(FourCC(*b"TXTR"), 1, 1).write(w, |_| Ok(()))
        });
        assert_eq!(data.len(), 64);
        data[36..44].copy_from_slice(&size.to_be_bytes());
        let err = load(data, &TypeRegistry::default()).unwrap_err();
        assert!(
            matches!(
                form_error(&err),
                FormError::TruncatedStream { offset: 32, need, have: 32 } if *need == size
            ),
            "{err:?}"
        );
    }
}

#[test]
fn chunk_layout_rules_match_dump() {
    let valid = form(b"TXTR", |w| chunk(w, b"HEAD", 4, &[0; 4]));
    load(valid.clone(), &TypeRegistry::default()).unwrap();
    dump_rfrm::<BigEndian, _>(&mut Vec::new(), &valid, 0).unwrap();

    // Offset past the chunk size, then a negative offset
    for skip in [9i64, -4] {
        let mut data = valid.clone();
        data[48..56].copy_from_slice(&skip.to_be_bytes());
        let err = load(data.clone(), &TypeRegistry::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid chunk \"HEAD\" layout"), "{err:#}");
        assert!(dump_rfrm::<BigEndian, _>(&mut Vec::new(), &data, 0).is_err());
    }
}

#[test]
fn footer_bounds_chunk_loop() {
    let mut data = form(b"CMDL", |w| chunk(w, b"GPU ", 0, &[0xAB; 12]));
    let primary = data.len() as u64;
    data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
    data.extend_from_slice(b"META");
    data.extend_from_slice(b"CMDL");
    data.extend_from_slice(&20u32.to_be_bytes());
    let len = data.len() as u64;

    let mut reader = Cursor::new(data.clone());
    assert!(has_footer(&mut reader).unwrap());
    let info = read_footer::<BigEndian, _>(&mut reader).unwrap();
    assert_eq!(reader.position(), 0);
    assert_eq!(info.kind(), K_FORM_CMDL);
    assert_eq!(info.size(), 20);
    assert_eq!(info.metadata_offset(), len - 20);
    assert_eq!(info.end_offset(), primary);

    // Opaque metadata, so the 8-byte block is not parsed as model metadata
    let (form, position) = load(data, &TypeRegistry::empty()).unwrap();
    assert_eq!(form.body.end, len - 20);
    assert_eq!(position, len - 20);
    assert_eq!(form.body.chunks.len(), 1);
    let metadata = form.body.metadata.as_ref().unwrap();
    assert_eq!(metadata.kind, K_FORM_CMDL);
    assert_eq!(metadata.offset, len - 20);
    assert_eq!(metadata.len, 8);
    let inert = metadata.handler.downcast_ref::<InertHandler>().unwrap();
    assert_eq!(inert.metadata, [1, 2, 3, 4, 5, 6, 7, 8]);
}

fn model_meta(read_offset: u32) -> SModelMetaData {
    SModelMetaData {
        unk: 0,
        gpu_offset: 56,
        read_info: vec![SModelReadBufferInfo { size: 0x20, offset: read_offset }],
        vtx_buffer_info: vec![SModelBufferInfo {
            read_index: 0,
            offset: 0,
            size: 0x10,
            dest_size: 0x40,
        }],
        idx_buffer_info: vec![],
    }
}

fn model_with_footer(meta: &SModelMetaData) -> (Vec<u8>, Vec<u8>, u32) {
    let data = form(b"CMDL", |w| chunk(w, b"GPU ", 0, &[0x5A; 0x20]));
    let mut raw = Cursor::new(Vec::new());
    raw.write_type(meta, Endian::Big).unwrap();
    let raw = raw.into_inner();

    let offset = data.len() as u64;
    let mut w = Cursor::new(data);
    let size =
        write_footer::<BigEndian, _>(&mut w, &TypeRegistry::default(), K_FORM_CMDL, &raw, offset)
            .unwrap();
    (w.into_inner(), raw, size)
}

#[test]
fn model_metadata_round_trip() {
    let meta = model_meta(56);
    let (data, raw, size) = model_with_footer(&meta);
    assert_eq!(raw.len(), 44);
    assert_eq!(size as usize, raw.len() + 12);
    assert_eq!(data.len(), 88 + 44 + 12);
    // Re-encoded metadata is byte-identical and starts `size` bytes from the end
    assert_eq!(&data[data.len() - size as usize..][..raw.len()], &raw[..]);

    let (form, position) = load(data, &TypeRegistry::default()).unwrap();
    assert_eq!(form.body.end, 88);
    assert_eq!(position, 88);
    let metadata = form.body.metadata.as_ref().unwrap();
    assert_eq!(metadata.offset, 88);
    assert_eq!(metadata.len, 44);
    let model = form.body.metadata_as::<ModelHandler>().unwrap();
    assert_eq!(model.meta.as_ref(), Some(&meta));
    let handler = form.handler.downcast_ref::<ModelHandler>().unwrap();
    assert_eq!(handler.chunk_ids, [FourCC(*b"GPU ")]);
}

#[test]
fn after_load_checks_metadata() {
    let (data, _, _) = model_with_footer(&model_meta(60));
    let err = load(data, &TypeRegistry::default()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to finish loading \"CMDL\" form"));
}

#[test]
fn nested_forms() {
    let data = form(b"CMDL", |w| {
        chunk(w, b"HEAD", 0, &[0; 8])?;
        FormDescriptor::<BigEndian>::new(FourCC(*b"TXTR"), 47, 51)
            .write(w, |w| chunk(w, b"TXTR", 0, &[0; 4]))?;
        chunk(w, b"MTRL", 0, &[0; 2])
    });
    let (form, position) = load(data, &TypeRegistry::default()).unwrap();
    assert_eq!(position, form.body.end);
    assert_eq!(form.body.chunks.len(), 2);
    assert_eq!(form.body.forms.len(), 1);

    let nested = &form.body.forms[0];
    assert_eq!(nested.id(), *b"TXTR");
    assert_eq!(nested.position, 32 + 24 + 8);
    assert_eq!(nested.header.reader_version.get(), 47);
    assert_eq!(nested.handler.name(), "texture");
    assert_eq!(nested.body.chunks[0].handler.name(), "texture");
    assert_eq!(form.body.chunks[1].position, nested.body.end);

    let summary = form.summary();
    assert_eq!(summary.forms.len(), 1);
    assert_eq!(summary.forms[0].chunks[0].handler, "texture");
    assert_eq!(summary.chunks[1].id, *b"MTRL");
}

#[test]
fn independent_loads_in_parallel() {
    let registry = &TypeRegistry::default();
    let streams: Vec<Vec<u8>> = (0..4u8)
        .map(|n| form(b"TXTR", |w| chunk(w, b"TXTR", 0, &vec![n; n as usize + 1])))
        .collect();
    std::thread::scope(|s| {
        let handles: Vec<_> = streams
            .iter()
            .map(|data| s.spawn(move || load(data.clone(), registry).unwrap().0))
            .collect();
        for (n, handle) in handles.into_iter().enumerate() {
            let form = handle.join().unwrap();
            let payload = form.body.chunks[0].payload();
            assert_eq!(payload.end - payload.start, n as u64 + 1);
        }
    });
}
