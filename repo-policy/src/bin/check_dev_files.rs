use std::process::ExitCode;

use repo_policy_core::registry::HookId;

fn main() -> ExitCode {
    repo_policy::main_for(Some(HookId::CheckDevFiles))
}
