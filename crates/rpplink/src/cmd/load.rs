use rpplink_frame::MODULE_MEMSPACE;
use rpplink_session::PrecompiledImage;
use serde::Serialize;

use crate::cmd::LoadArgs;
use crate::exit::{io_error, session_error, CliResult, SUCCESS};
use crate::output::{print_fields, print_json, print_pretty_fields, OutputFormat};

#[derive(Serialize)]
struct LoadOutput<'a> {
    module: &'a str,
    image: String,
    bytes: usize,
    memspace: u8,
    started: bool,
}

pub fn run(args: LoadArgs, format: OutputFormat) -> CliResult<i32> {
    let image = std::fs::read(&args.image)
        .map_err(|err| io_error(&format!("reading {}", args.image.display()), err))?;

    let mut session = args.target.open()?;
    session
        .add_module(&args.name, &image, &PrecompiledImage)
        .map_err(|err| session_error("loading module failed", err))?;
    if args.start {
        session
            .start_thread(&args.name)
            .and_then(|()| session.wait_outstanding())
            .map_err(|err| session_error("starting thread failed", err))?;
    }

    let out = LoadOutput {
        module: &args.name,
        image: args.image.display().to_string(),
        bytes: image.len(),
        memspace: MODULE_MEMSPACE,
        started: args.start,
    };
    let fields = [
        ("module", out.module.to_string()),
        ("image", out.image.clone()),
        ("bytes", out.bytes.to_string()),
        ("memspace", out.memspace.to_string()),
        ("started", out.started.to_string()),
    ];
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_fields(&fields),
        OutputFormat::Pretty => print_pretty_fields("Loaded", &fields),
    }

    session
        .terminate()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}
