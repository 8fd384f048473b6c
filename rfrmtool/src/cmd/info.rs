use std::{io::Cursor, path::PathBuf};

use anyhow::{Context, Result};
use argh::FromArgs;
use rfrmlib::{
    format::{form::Form, registry::TypeRegistry},
    util::file::map_file,
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// load an RFRM file and describe its contents
#[argh(subcommand, name = "info")]
pub struct Args {
    #[argh(positional)]
    /// input file
    input: PathBuf,
    #[argh(switch)]
    /// print a JSON summary instead
    json: bool,
}

pub fn run(args: Args) -> Result<()> {
    let data = map_file(&args.input)?;
    let registry = TypeRegistry::default();
    let form = Form::read(&mut Cursor::new(&*data), &registry)
        .with_context(|| format!("Failed to load '{}'", args.input.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&form.summary())?);
        return Ok(());
    }

    log::info!("File: {} ({:#X} bytes)", args.input.display(), data.len());
    log_form(&form, 0);
    match &form.body.metadata {
        Some(meta) => log::info!(
            "Metadata: {} at {:#X}, {:#X} bytes ({})",
            meta.kind,
            meta.offset,
            meta.len,
            meta.handler.name()
        ),
        None => log::info!("Metadata: none"),
    }
    Ok(())
}

fn log_form(form: &Form, indent: usize) {
    let indstr = "  ".repeat(indent);
    let header = &form.header;
    log::info!(
        "{indstr}{} form at {:#X} (version {}/{}, data end {:#X}, {})",
        form.id(),
        form.position,
        header.reader_version.get(),
        header.writer_version.get(),
        form.body.end,
        form.handler.name()
    );
    for chunk in &form.body.chunks {
        let payload = chunk.payload();
        log::info!(
            "{indstr}- {} at {:#X}: data {:#X}-{:#X} ({})",
            chunk.id(),
            chunk.position,
            payload.start,
            payload.end,
            chunk.handler.name()
        );
    }
    for nested in &form.body.forms {
        log_form(nested, indent + 1);
    }
}
