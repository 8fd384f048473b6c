use std::{
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use argh::FromArgs;
use rfrmlib::{
    format::{form::FormEndian, rfrm::dump_rfrm},
    util::file::map_file,
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print the descriptor tree of an RFRM file
#[argh(subcommand, name = "dump")]
pub struct Args {
    #[argh(positional)]
    /// input file
    input: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    let data = map_file(&args.input)?;
    let mut out = BufWriter::new(std::io::stdout().lock());
    dump_rfrm::<FormEndian, _>(&mut out, &data, 0)
        .with_context(|| format!("Failed to dump '{}'", args.input.display()))?;
    out.flush()?;
    Ok(())
}
