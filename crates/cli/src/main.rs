use std::process::ExitCode;

fn main() -> ExitCode {
    cookhouse_cli::run()
}
