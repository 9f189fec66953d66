use std::process::ExitCode;

use clap::Parser;
use galleryfe::cli::{self, CliArgs};
use galleryfe::logger;

fn main() -> ExitCode {
    logger::init();
    let args = CliArgs::parse();
    let code = cli::run(args);
    galleryfe::log_info!("Exiting");
    code
}
