use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rpplink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rpplink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("RPPLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: serial={}, cli=true",
        cfg!(feature = "serial")
    );
    println!(
        "defaults: baud={}, receive_buffer={}, block_segment={}",
        rpplink_transport::DEFAULT_BAUD_RATE,
        rpplink_frame::DEFAULT_RECEIVE_BUFFER_SIZE,
        rpplink_frame::DEFAULT_SEGMENT_SIZE
    );

    Ok(SUCCESS)
}
