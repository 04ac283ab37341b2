use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rpplink_session::OutputLine;
use serde::Serialize;

use crate::cmd::MonitorArgs;
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{format_address, print_json, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct LineOutput<'a> {
    thread: String,
    text: &'a str,
}

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut session = args.target.open()?;
    session
        .synchronize()
        .map_err(|err| session_error("sync failed", err))?;
    let word_size = session
        .parameters()
        .map_or(4, |params| usize::from(params.word_size));

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let line = session
            .next_output(POLL_INTERVAL)
            .map_err(|err| session_error("monitor failed", err))?;
        let Some(line) = line else {
            continue;
        };
        print_line(&line, word_size, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    session
        .terminate()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

fn print_line(line: &OutputLine, word_size: usize, format: OutputFormat) {
    let thread = format_address(line.thread, word_size);
    match format {
        OutputFormat::Json => print_json(&LineOutput {
            thread,
            text: &line.text,
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("[{thread}] {}", line.text),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
