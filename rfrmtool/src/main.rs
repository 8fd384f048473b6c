mod cmd;

use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// Tools for inspecting and writing RFRM chunked containers.
struct TopLevel {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum SubCommand {
    Dump(cmd::dump::Args),
    Footer(cmd::footer::Args),
    Info(cmd::info::Args),
    Types(cmd::types::Args),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .format_level(false)
        .init();

    let args: TopLevel = argh::from_env();
    let result = match args.command {
        SubCommand::Dump(args) => cmd::dump::run(args),
        SubCommand::Footer(args) => cmd::footer::run(args),
        SubCommand::Info(args) => cmd::info::run(args),
        SubCommand::Types(args) => cmd::types::run(args),
    };
    if let Err(e) = result {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}
