use serde::Serialize;

use crate::cmd::StartArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct StartOutput<'a> {
    module: &'a str,
    started: bool,
}

pub fn run(args: StartArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.target.open()?;
    session
        .start_thread(&args.module)
        .and_then(|()| session.wait_outstanding())
        .map_err(|err| session_error("starting thread failed", err))?;

    let out = StartOutput {
        module: &args.module,
        started: true,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("started thread for module {}", out.module);
        }
    }

    session
        .terminate()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}
