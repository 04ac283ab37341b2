use serde::Serialize;

use crate::cmd::ThreadsArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{format_address, print_json, table, OutputFormat};

#[derive(Serialize)]
struct ThreadsOutput {
    count: usize,
    threads: Vec<String>,
}

pub fn run(args: ThreadsArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.target.open()?;
    let threads = session
        .read_thread_list()
        .map_err(|err| session_error("reading thread list failed", err))?;
    let word_size = session
        .parameters()
        .map_or(4, |params| usize::from(params.word_size));

    let out = ThreadsOutput {
        count: threads.len(),
        threads: threads
            .iter()
            .map(|&address| format_address(address, word_size))
            .collect(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = table(&["#", "THREAD"]);
            for (index, thread) in out.threads.iter().enumerate() {
                table.add_row(vec![index.to_string(), thread.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} thread(s)", out.count);
            for thread in &out.threads {
                println!("  {thread}");
            }
        }
    }

    session
        .terminate()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}
