use std::process::ExitCode;

fn main() -> ExitCode {
    tabletalk_cli::run()
}
