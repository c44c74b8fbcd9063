use std::process::ExitCode;

fn main() -> ExitCode {
    segmint_cli::run()
}
