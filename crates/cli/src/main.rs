use std::process::ExitCode;

fn main() -> ExitCode {
    tierflow_cli::run()
}
