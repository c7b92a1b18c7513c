use clap::Parser;
use unquantified::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
