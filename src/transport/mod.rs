//! CS-017: Script execution seam for the boot runner.

pub mod local;

/// Output from executing a script.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, or the exit code when stderr is silent.
    pub fn failure_reason(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exit code {}", self.exit_code))
    }
}

/// Runs generated shell on the current host.
///
/// The boot runner only talks to this trait, so tests can substitute a
/// runner that fails or records scripts without touching block devices.
pub trait ScriptRunner {
    fn run(&self, script: &str) -> Result<ExecOutput, String>;
}

/// Runs scripts with the local `bash`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl ScriptRunner for LocalRunner {
    fn run(&self, script: &str) -> Result<ExecOutput, String> {
        local::exec_local(script)
    }
}
