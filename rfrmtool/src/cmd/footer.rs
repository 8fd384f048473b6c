use std::{
    fs,
    io::{Cursor, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use argh::FromArgs;
use rfrmlib::{
    format::{
        foot::{has_footer, read_footer, write_footer},
        form::FormEndian,
        registry::TypeRegistry,
        FourCC,
    },
    util::file::{create_file, map_file},
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// append a metadata footer to an RFRM file
#[argh(subcommand, name = "footer")]
pub struct Args {
    #[argh(positional)]
    /// input file
    input: PathBuf,
    #[argh(option, from_str_fn(parse_four_cc))]
    /// metadata type code (e.g. CMDL)
    kind: FourCC,
    #[argh(option)]
    /// raw metadata block
    meta: PathBuf,
    #[argh(option, short = 'o')]
    /// output file (default: input with .meta appended)
    output: Option<PathBuf>,
}

fn parse_four_cc(value: &str) -> Result<FourCC, String> {
    FourCC::try_from(value).map_err(|e| e.to_string())
}

pub fn run(args: Args) -> Result<()> {
    let data = map_file(&args.input)?;
    let metadata = fs::read(&args.meta)
        .with_context(|| format!("Failed to read metadata '{}'", args.meta.display()))?;

    let mut reader = Cursor::new(&*data);
    let primary = if has_footer(&mut reader)? {
        let info = read_footer::<FormEndian, _>(&mut reader)?;
        log::info!("Replacing existing {} footer ({:#X} bytes)", info.kind(), info.size());
        &data[..info.end_offset() as usize]
    } else {
        &data[..]
    };

    // Assemble in memory, then write out in one go
    let mut out = Cursor::new(primary.to_vec());
    let size = write_footer::<FormEndian, _>(
        &mut out,
        &TypeRegistry::default(),
        args.kind,
        &metadata,
        primary.len() as u64,
    )?;

    let path = args.output.unwrap_or_else(|| {
        let mut path = args.input.clone().into_os_string();
        path.push(".meta");
        path.into()
    });
    log::info!("Writing {} ({} footer, size {size:#X})", path.display(), args.kind);
    let mut file = create_file(&path)?;
    file.write_all(out.get_ref())?;
    file.flush()?;
    Ok(())
}
