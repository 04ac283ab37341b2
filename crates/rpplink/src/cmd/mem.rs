use std::collections::BTreeMap;

use rpplink_frame::{MemSpace, MODULE_MEMSPACE};
use serde::Serialize;

use crate::cmd::MemArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct MemSpaceOutput {
    index: u8,
    name: String,
    size: u32,
    writeable: bool,
    modules: bool,
}

fn mem_output(spaces: &BTreeMap<u8, MemSpace>) -> Vec<MemSpaceOutput> {
    spaces
        .iter()
        .map(|(&index, space)| MemSpaceOutput {
            index,
            name: space.name.clone(),
            size: space.size,
            writeable: space.writeable,
            modules: index == MODULE_MEMSPACE,
        })
        .collect()
}

pub fn run(args: MemArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.target.open()?;
    let spaces = session
        .read_mem_list()
        .map_err(|err| session_error("reading memory spaces failed", err))?;

    let out = mem_output(&spaces);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = table(&["INDEX", "NAME", "SIZE", "WRITEABLE"]);
            for space in &out {
                table.add_row(vec![
                    space.index.to_string(),
                    space.name.clone(),
                    space.size.to_string(),
                    if space.writeable { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for space in &out {
                println!(
                    "{:>3}  {:<16} {:>8} bytes{}{}",
                    space.index,
                    space.name,
                    space.size,
                    if space.writeable { "  rw" } else { "  ro" },
                    if space.modules { "  (modules)" } else { "" }
                );
            }
        }
    }

    session
        .terminate()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}
