use crate::errors::RereError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessRequest {
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, RereError>;
    fn wait(&self, handle: u64) -> Result<ProcessOutput, RereError>;

    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, RereError> {
        let handle = self.spawn(request)?;
        self.wait(handle)
    }
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, RereError>;
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, RereError>;
    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), RereError>;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), RereError>;
    fn write_error_line(&self, line: &str) -> Result<(), RereError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RereError> {
        std::fs::read_to_string(path)
            .map_err(|e| RereError::Io(format!("{}: {e}", path.display())))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, RereError> {
        std::fs::read(path).map_err(|e| RereError::Io(format!("{}: {e}", path.display())))
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), RereError> {
        std::fs::write(path, contents)
            .map_err(|e| RereError::Io(format!("{}: {e}", path.display())))
    }
}

#[derive(Default)]
struct ProcessState {
    next_handle: u64,
    children: HashMap<u64, std::process::Child>,
}

pub struct ProductionProcessRunner {
    state: Mutex<ProcessState>,
}

impl ProductionProcessRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::default()),
        }
    }
}

impl Default for ProductionProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, RereError> {
        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| RereError::Process(format!("{}: {e}", request.program)))?;
        let mut state = self.state.lock().expect("process lock poisoned");
        let handle = state.next_handle;
        state.next_handle += 1;
        state.children.insert(handle, child);
        Ok(handle)
    }

    fn wait(&self, handle: u64) -> Result<ProcessOutput, RereError> {
        let child = {
            let mut state = self.state.lock().expect("process lock poisoned");
            state.children.remove(&handle)
        };
        let child = child.ok_or_else(|| RereError::Process(format!("unknown handle {handle}")))?;
        let output = child
            .wait_with_output()
            .map_err(|e| RereError::Process(e.to_string()))?;
        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), RereError> {
        use std::io::Write;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").map_err(|e| RereError::Io(e.to_string()))
    }

    fn write_error_line(&self, line: &str) -> Result<(), RereError> {
        use std::io::Write;
        let mut err = std::io::stderr().lock();
        writeln!(err, "{line}").map_err(|e| RereError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner::new()),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    fail_next: Arc<Mutex<Option<RereError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        let fs = Self::default();
        fs.insert(path, contents);
        fs
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    pub fn set_fail_next(&self, error: RereError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    fn maybe_fail(&self) -> Result<(), RereError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RereError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|e| RereError::Io(format!("{}: {e}", path.display())))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, RereError> {
        self.maybe_fail()?;
        self.contents(path)
            .ok_or_else(|| RereError::Io(format!("missing file {}", path.display())))
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), RereError> {
        self.maybe_fail()?;
        self.insert(path, contents);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), RereError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn write_error_line(&self, line: &str) -> Result<(), RereError> {
        self.errors
            .lock()
            .expect("errors lock")
            .push(line.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FakeResponse {
    output: ProcessOutput,
    delay: Duration,
}

#[derive(Default)]
struct FakeProcessState {
    responses: HashMap<String, FakeResponse>,
    pending: HashMap<u64, ProcessRequest>,
    spawned: Vec<ProcessRequest>,
    next_handle: u64,
    in_flight: usize,
    max_in_flight: usize,
}

/// Scripted runner keyed by command line. Unknown commands fail to spawn,
/// the way a missing binary does.
#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    state: Arc<Mutex<FakeProcessState>>,
}

impl FakeProcessRunner {
    pub fn respond(&self, command_line: &str, output: ProcessOutput) {
        self.respond_after(command_line, output, Duration::ZERO);
    }

    pub fn respond_after(&self, command_line: &str, output: ProcessOutput, delay: Duration) {
        self.state
            .lock()
            .expect("fake process lock")
            .responses
            .insert(command_line.to_string(), FakeResponse { output, delay });
    }

    pub fn spawned(&self) -> Vec<ProcessRequest> {
        self.state.lock().expect("fake process lock").spawned.clone()
    }

    /// Highest number of commands observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().expect("fake process lock").max_in_flight
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, RereError> {
        let mut state = self.state.lock().expect("fake process lock");
        state.spawned.push(request.clone());
        if !state.responses.contains_key(&request.command_line()) {
            return Err(RereError::Process(format!(
                "{}: No such file or directory",
                request.program
            )));
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        state.pending.insert(handle, request);
        Ok(handle)
    }

    fn wait(&self, handle: u64) -> Result<ProcessOutput, RereError> {
        let response = {
            let state = self.state.lock().expect("fake process lock");
            let request = state
                .pending
                .get(&handle)
                .ok_or_else(|| RereError::Process(format!("unknown handle {handle}")))?;
            state.responses.get(&request.command_line()).cloned()
        };
        let response =
            response.ok_or_else(|| RereError::Process(format!("no response for {handle}")))?;
        if !response.delay.is_zero() {
            std::thread::sleep(response.delay);
        }
        let mut state = self.state.lock().expect("fake process lock");
        state.pending.remove(&handle);
        state.in_flight = state.in_flight.saturating_sub(1);
        Ok(response.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn fake_runner_serves_scripted_output_and_rejects_unknown_commands() {
        let runner = FakeProcessRunner::default();
        runner.respond("echo hi", ok("hi\n"));

        let out = runner
            .run(ProcessRequest {
                program: "echo".to_string(),
                args: vec!["hi".to_string()],
            })
            .expect("scripted command runs");
        assert_eq!(out.stdout, b"hi\n");

        let missing = runner.run(ProcessRequest {
            program: "nope".to_string(),
            args: Vec::new(),
        });
        assert!(matches!(missing, Err(RereError::Process(_))));
        assert_eq!(runner.spawned().len(), 2);
        assert_eq!(runner.max_in_flight(), 1);
    }

    #[test]
    fn fake_file_system_fails_once_when_armed() {
        let fs = FakeFileSystem::with_file("/list", "echo a\n");
        fs.set_fail_next(RereError::Io("boom".to_string()));
        assert!(fs.read_to_string(Path::new("/list")).is_err());
        assert_eq!(
            fs.read_to_string(Path::new("/list")).expect("second read"),
            "echo a\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn production_runner_captures_binary_output_and_exit_code() {
        let runner = ProductionProcessRunner::new();
        let out = runner
            .run(ProcessRequest {
                program: "printf".to_string(),
                args: vec!["a\\0b".to_string()],
            })
            .expect("printf runs");
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, b"a\0b");

        let failed = runner
            .run(ProcessRequest {
                program: "false".to_string(),
                args: Vec::new(),
            })
            .expect("false runs");
        assert_eq!(failed.exit_code, Some(1));
    }
}
