use rpplink_frame::{segment_size_for, SyncParameters};
use serde::Serialize;

use crate::cmd::SyncArgs;
use crate::exit::{session_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_fields, print_json, print_pretty_fields, OutputFormat};

#[derive(Serialize)]
struct SyncOutput {
    link: String,
    target_id: String,
    reset: bool,
    receive_buffer_size: u8,
    /// Data capacity of one outgoing frame.
    segment_size: Option<usize>,
    word_size: u8,
    synchronized: bool,
}

pub fn run(args: SyncArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.target.open()?;
    session
        .synchronize()
        .map_err(|err| session_error("sync failed", err))?;

    let params = session
        .parameters()
        .ok_or_else(|| CliError::new(FAILURE, "target sent no link parameters"))?;
    let out = sync_output(session.channel().description(), &params);
    print_sync(&out, format);

    session
        .terminate()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

fn sync_output(link: &str, params: &SyncParameters) -> SyncOutput {
    SyncOutput {
        link: link.to_string(),
        target_id: params.id_string(),
        reset: params.reset,
        receive_buffer_size: params.receive_buffer_size,
        segment_size: segment_size_for(params.receive_buffer_size),
        word_size: params.word_size,
        synchronized: true,
    }
}

fn print_sync(out: &SyncOutput, format: OutputFormat) {
    let fields = [
        ("link", out.link.clone()),
        ("target id", out.target_id.clone()),
        ("receive buffer", format!("{} bytes", out.receive_buffer_size)),
        (
            "block segment",
            out.segment_size
                .map_or_else(|| "n/a".to_string(), |size| format!("{size} bytes")),
        ),
        ("word size", format!("{} bytes", out.word_size)),
        ("reset", out.reset.to_string()),
    ];
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_fields(&fields),
        OutputFormat::Pretty => print_pretty_fields("Target", &fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_derives_segment_size() {
        let params = SyncParameters {
            reset: true,
            receive_buffer_size: 50,
            word_size: 4,
            id: SyncParameters::pad_id(b"PyMite"),
        };
        let out = sync_output("pipe:vm", &params);
        assert_eq!(out.segment_size, Some(44));
        assert_eq!(out.target_id, "PyMite");

        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"word_size\":4"));
    }
}
