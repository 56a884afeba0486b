use std::process::ExitCode;

fn main() -> ExitCode {
    pathbar_lib::run()
}
