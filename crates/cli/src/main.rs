use std::process::ExitCode;

fn main() -> ExitCode {
    fenestra_cli::run()
}
