use serde::Serialize;

use crate::cmd::AutorunArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct AutorunOutput {
    updated: bool,
    modules: Vec<String>,
}

pub fn run(args: AutorunArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.target.open()?;

    let update = if args.clear {
        Some(Vec::new())
    } else {
        args.set.clone()
    };
    if let Some(names) = &update {
        tracing::info!(modules = ?names, "replacing autorun list");
        session
            .send_autorun_list(names.as_slice())
            .and_then(|()| session.wait_outstanding())
            .map_err(|err| session_error("updating autorun list failed", err))?;
    }

    // Read back so the output shows what the target actually stored.
    let modules = session
        .read_autorun_list()
        .map_err(|err| session_error("reading autorun list failed", err))?;

    let out = AutorunOutput {
        updated: update.is_some(),
        modules,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = table(&["#", "MODULE"]);
            for (index, module) in out.modules.iter().enumerate() {
                table.add_row(vec![index.to_string(), module.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if out.modules.is_empty() {
                println!("autorun list is empty");
            } else {
                println!("autorun: {}", out.modules.join(", "));
            }
        }
    }

    session
        .terminate()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}
