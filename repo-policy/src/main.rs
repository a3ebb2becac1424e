use std::process::ExitCode;

fn main() -> ExitCode {
    repo_policy::main_for(None)
}
