mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rpplink", version, about = "Remote PyMite Protocol client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_flags() {
        let cli = Cli::try_parse_from([
            "rpplink",
            "threads",
            "--serial",
            "/dev/ttyUSB0",
            "--baud",
            "115200",
            "--timeout",
            "500ms",
        ])
        .expect("threads args should parse");

        let Command::Threads(args) = cli.command else {
            panic!("expected threads");
        };
        assert_eq!(args.target.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(args.target.baud, 115_200);
        assert_eq!(args.target.retries, 3);
    }

    #[test]
    fn rejects_set_with_clear() {
        let err = Cli::try_parse_from(["rpplink", "autorun", "--set", "a,b", "--clear"])
            .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn splits_autorun_names() {
        let cli = Cli::try_parse_from(["rpplink", "autorun", "--set", "boot,app"])
            .expect("autorun args should parse");
        let Command::Autorun(args) = cli.command else {
            panic!("expected autorun");
        };
        assert_eq!(
            args.set,
            Some(vec!["boot".to_string(), "app".to_string()])
        );
    }

    #[test]
    fn load_requires_name_and_image() {
        let cli = Cli::try_parse_from(["rpplink", "load", "mod1", "mod1.pmm", "--start"])
            .expect("load args should parse");
        let Command::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert_eq!(args.name, "mod1");
        assert!(args.start);

        assert!(Cli::try_parse_from(["rpplink", "load", "mod1"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rpplink", "dump", "x.pmm", "--format", "json"])
            .expect("dump args should parse");
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }
}
