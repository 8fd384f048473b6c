use anyhow::Result;
use argh::FromArgs;
use rfrmlib::format::{handler::InertHandler, registry::TypeRegistry};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// list registered type handlers
#[argh(subcommand, name = "types")]
pub struct Args {}

pub fn run(_args: Args) -> Result<()> {
    let registry = TypeRegistry::default();
    for (kind, factory) in registry.iter() {
        log::info!("{kind}: {}", factory().name());
    }
    log::info!("Other types: {}", InertHandler::create().name());
    Ok(())
}
