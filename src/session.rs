use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use tempfile::TempDir;

use crate::config;
use crate::error::{Error, Result};
use crate::output::{self, LineBuffer, OutputParser};
use crate::registers::RegisterTable;
use crate::runner::{self, Cancel, Job, RunEvent, Stage, Toolchain};
use crate::validator::{self, Diagnostic};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    SyntaxErrors,
    Assembling,
    Simulating,
    Complete,
    AssemblerFailed,
    SimulatorFailed,
    Error(String),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ready => write!(f, "Ready"),
            Status::SyntaxErrors => write!(f, "Syntax errors found"),
            Status::Assembling => write!(f, "Running assembly code..."),
            Status::Simulating => write!(f, "Running simulator..."),
            Status::Complete => write!(f, "Execution complete"),
            Status::AssemblerFailed => write!(f, "Assembler failed"),
            Status::SimulatorFailed => write!(f, "Simulator failed"),
            Status::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// Owns everything a run mutates: the register table, the parser cursor and
/// the output log. Events from the worker are applied only here, so no
/// locking is needed.
pub struct Session {
    toolchain: Toolchain,
    workspace: TempDir,
    registers: RegisterTable,
    parser: OutputParser,
    assembler_lines: LineBuffer,
    output: Vec<String>,
    error_lines: Vec<usize>,
    status: Status,
    last_binary: Option<PathBuf>,
    /// Binary the in-flight assembler is writing; promoted to `last_binary`
    /// only on a clean exit.
    assembling: Option<PathBuf>,
    runs: usize,
    events: Option<Receiver<RunEvent>>,
    cancel: Cancel,
}

impl Session {
    pub fn new(toolchain: Toolchain) -> Result<Self> {
        let workspace = tempfile::Builder::new()
            .prefix("z16ide-")
            .tempdir()
            .map_err(Error::Workspace)?;
        tracing::debug!(path = %workspace.path().display(), "created run workspace");

        Ok(Session {
            toolchain,
            workspace,
            registers: RegisterTable::new(),
            parser: OutputParser::new(),
            assembler_lines: LineBuffer::new(),
            output: Vec::new(),
            error_lines: Vec::new(),
            status: Status::Ready,
            last_binary: None,
            assembling: None,
            runs: 0,
            events: None,
            cancel: Cancel::default(),
        })
    }

    pub fn registers(&self) -> &RegisterTable {
        &self.registers
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Source lines the assembler complained about, in the order reported.
    pub fn error_lines(&self) -> &[usize] {
        &self.error_lines
    }

    pub fn is_running(&self) -> bool {
        self.events.is_some()
    }

    pub fn last_binary(&self) -> Option<&Path> {
        self.last_binary.as_deref()
    }

    /// Validates `source` and, if it is clean, assembles and simulates it.
    ///
    /// Diagnostics are returned (and written to the output log) without
    /// launching anything.
    pub fn run_source(&mut self, source: &str) -> std::result::Result<(), Vec<Diagnostic>> {
        let diagnostics = validator::validate(source);
        if !diagnostics.is_empty() {
            self.abandon();
            self.output.clear();
            self.output.push("Syntax Errors Found:".to_string());
            self.output.extend(diagnostics.iter().map(Diagnostic::to_string));
            self.status = Status::SyntaxErrors;
            tracing::info!(count = diagnostics.len(), "syntax check failed");
            return Err(diagnostics);
        }

        self.begin_run();
        let dir = match self.run_dir() {
            Ok(dir) => dir,
            Err(error) => {
                self.fail(error);
                return Ok(());
            }
        };
        let source_path = dir.join(config::SOURCE_FILE_NAME);
        let binary = dir.join(config::BINARY_FILE_NAME);
        if let Err(err) = std::fs::write(&source_path, source) {
            self.fail(Error::WriteSource {
                path: source_path,
                source: err,
            });
            return Ok(());
        }

        self.status = Status::Assembling;
        self.assembling = Some(binary.clone());
        self.start(Job {
            source: Some(source_path),
            binary,
        });
        Ok(())
    }

    /// Runs the simulator directly on an existing binary, starting from a
    /// cleared register table.
    pub fn load_binary(&mut self, path: &Path) {
        self.begin_run();
        self.registers.reset();
        self.status = Status::Simulating;
        self.last_binary = Some(path.to_path_buf());
        self.start(Job {
            source: None,
            binary: path.to_path_buf(),
        });
    }

    /// Simulates the last binary that assembled cleanly or was loaded.
    /// Returns `false` if there is none.
    pub fn rerun(&mut self) -> bool {
        match self.last_binary.clone() {
            Some(path) => {
                self.load_binary(&path);
                true
            }
            None => false,
        }
    }

    /// Applies every pending event without blocking.
    pub fn pump(&mut self) {
        while let Some(rx) = &self.events {
            match rx.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.finish_run(),
            }
        }
    }

    /// Blocks until the current run is over, calling `on_line` for each new
    /// output line as it arrives.
    pub fn wait(&mut self, mut on_line: impl FnMut(&str)) {
        let mut shown = 0;
        while let Some(rx) = &self.events {
            match rx.recv() {
                Ok(event) => self.apply(event),
                Err(_) => self.finish_run(),
            }
            for line in &self.output[shown..] {
                on_line(line);
            }
            shown = self.output.len();
        }
    }

    fn begin_run(&mut self) {
        self.abandon();
        self.parser.reset();
        self.assembler_lines.clear();
        self.output.clear();
        self.error_lines.clear();
        self.assembling = None;
    }

    /// Each run gets its own directory so an abandoned assembler can never
    /// write the binary a later run simulates.
    fn run_dir(&mut self) -> Result<PathBuf> {
        self.runs += 1;
        let dir = self.workspace.path().join(format!("run-{}", self.runs));
        std::fs::create_dir(&dir).map_err(Error::Workspace)?;
        Ok(dir)
    }

    fn start(&mut self, job: Job) {
        tracing::info!(binary = %job.binary.display(), assemble = job.source.is_some(), "starting run");
        let (tx, rx) = mpsc::channel();
        self.cancel = Cancel::default();
        // The worker is detached; `cancel` is how it is stopped.
        drop(runner::spawn(self.toolchain.clone(), job, tx, self.cancel.clone()));
        self.events = Some(rx);
    }

    fn abandon(&mut self) {
        if self.events.take().is_some() {
            tracing::info!("abandoning in-flight run");
            self.cancel.cancel();
        }
    }

    fn fail(&mut self, error: Error) {
        self.output.push(error.to_string());
        self.status = Status::Error(error.to_string());
    }

    fn finish_run(&mut self) {
        self.flush_lines();
        tracing::debug!(section = ?self.parser.state(), status = %self.status, "run finished");
        self.events = None;
    }

    fn flush_lines(&mut self) {
        if let Some(line) = self.assembler_lines.finish() {
            self.push_assembler_line(line);
        }
        if let Some(line) = self.parser.finish(&mut self.registers) {
            self.output.push(line);
        }
    }

    fn apply(&mut self, event: RunEvent) {
        match event {
            RunEvent::Started(Stage::Assemble) => self.status = Status::Assembling,
            RunEvent::Started(Stage::Simulate) => {
                self.parser.reset();
                self.status = Status::Simulating;
            }
            RunEvent::Output(Stage::Assemble, chunk) => {
                for line in self.assembler_lines.push(&chunk) {
                    self.push_assembler_line(line);
                }
            }
            RunEvent::Output(Stage::Simulate, chunk) => {
                let lines = self.parser.feed(&chunk, &mut self.registers);
                self.output.extend(lines);
            }
            RunEvent::Exited(stage, status) => {
                self.flush_lines();
                match stage {
                    _ if !status.success() => {
                        self.output.push(exit_message(stage, status));
                        self.status = match stage {
                            Stage::Assemble => Status::AssemblerFailed,
                            Stage::Simulate => Status::SimulatorFailed,
                        };
                    }
                    Stage::Assemble => self.last_binary = self.assembling.take(),
                    Stage::Simulate => self.status = Status::Complete,
                }
            }
            RunEvent::Failed(error) => self.fail(error),
            RunEvent::Done => self.finish_run(),
        }
    }

    fn push_assembler_line(&mut self, line: String) {
        if let Some(number) = output::assembler_error_line(&line) {
            self.error_lines.push(number);
        }
        self.output.push(line);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abandon();
    }
}

fn exit_message(stage: Stage, status: ExitStatus) -> String {
    let tool = match stage {
        Stage::Assemble => "Assembler",
        Stage::Simulate => "Simulator",
    };
    match status.code() {
        Some(code) => format!("{tool} exited with status {code}"),
        None => format!("{tool} terminated ({status})"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DUMP: &str = "Loaded 4 bytes into memory\n\
        0x0000: 7E13 li t0, 15\n\
        \n\
        --- Final Register State ---\n\
        t0 (x0): 0x000F (15)\n\
        a0 (x6): 0x0003 (3)\n\
        PC: 0x0004\n\
        ---------------------------\n";

    fn toolchain(assembler: &str, simulator: &str) -> Toolchain {
        Toolchain {
            assembler: assembler.into(),
            simulator: simulator.into(),
        }
    }

    /// A "binary" that `sh` turns into simulator output.
    fn dump_script(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("dump.sh");
        std::fs::write(&path, format!("cat <<'EOF'\n{text}EOF\n")).unwrap();
        path
    }

    #[test]
    fn test_syntax_errors_block_the_run() {
        let mut session = Session::new(toolchain("/nonexistent/asm", "/nonexistent/sim")).unwrap();
        let err = session.run_source("li a0 1\nfoo bar\nbaz\n").unwrap_err();

        assert_eq!(err.iter().map(|d| d.line).collect::<Vec<_>>(), vec![2, 3]);
        assert!(!session.is_running());
        assert_eq!(session.status(), &Status::SyntaxErrors);
        assert_eq!(
            session.output(),
            [
                "Syntax Errors Found:",
                "Line 2: Invalid instruction: foo bar",
                "Line 3: Invalid instruction: baz",
            ]
        );
    }

    #[test]
    fn test_load_binary_resets_and_parses_registers() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dump_script(dir.path(), DUMP);
        let mut session = Session::new(toolchain("true", "sh")).unwrap();

        session.load_binary(&binary);
        session.wait(|_| {});

        let registers = session.registers();
        assert_eq!(registers.get("t0"), Some("0x000F"));
        assert_eq!(registers.get("a0"), Some("0x0003"));
        assert_eq!(registers.pc(), "0x0004");
        assert_eq!(registers.get("sp"), Some("0x0000"));
        assert_eq!(session.status(), &Status::Complete);
        assert_eq!(session.output().len(), DUMP.lines().count());
        assert_eq!(session.last_binary(), Some(binary.as_path()));
    }

    #[test]
    fn test_rerun_clears_previous_registers() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dump_script(dir.path(), DUMP);
        let mut session = Session::new(toolchain("true", "sh")).unwrap();
        session.load_binary(&binary);
        session.wait(|_| {});

        std::fs::write(&binary, "echo no registers this time\n").unwrap();
        assert!(session.rerun());
        session.wait(|_| {});

        assert_eq!(session.registers(), &RegisterTable::new());
        assert_eq!(session.output(), ["no registers this time"]);
    }

    #[test]
    fn test_rerun_without_binary() {
        let mut session = Session::new(Toolchain::default()).unwrap();
        assert!(!session.rerun());
        assert_eq!(session.status(), &Status::Ready);
    }

    #[test]
    fn test_assembler_failure_keeps_registers() {
        let mut session = Session::new(toolchain("false", "sh")).unwrap();
        session.registers.update("t1", "0x0009");

        session.run_source("li t1 9\n").unwrap();
        session.wait(|_| {});

        assert_eq!(session.status(), &Status::AssemblerFailed);
        assert_eq!(session.registers().get("t1"), Some("0x0009"));
        assert_eq!(session.output().last().map(String::as_str), Some("Assembler exited with status 1"));
    }

    #[test]
    fn test_failed_assembly_does_not_become_rerun_target() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dump_script(dir.path(), DUMP);
        let mut session = Session::new(toolchain("false", "sh")).unwrap();
        session.run_source("li a0 1\n").unwrap();
        session.wait(|_| {});
        assert_eq!(session.last_binary(), None);
        assert!(!session.rerun());

        session.load_binary(&binary);
        session.wait(|_| {});
        session.run_source("li a0 2\n").unwrap();
        session.wait(|_| {});
        assert_eq!(session.last_binary(), Some(binary.as_path()));
    }

    #[test]
    fn test_simulator_failure_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dump_script(dir.path(), DUMP);
        std::fs::write(&binary, format!("cat <<'EOF'\n{DUMP}EOF\nexit 3\n")).unwrap();
        let mut session = Session::new(toolchain("true", "sh")).unwrap();

        session.load_binary(&binary);
        session.wait(|_| {});

        assert_eq!(session.status(), &Status::SimulatorFailed);
        assert_eq!(session.output().last().map(String::as_str), Some("Simulator exited with status 3"));
        assert_eq!(session.registers().get("t0"), Some("0x000F"));
    }

    #[test]
    fn test_new_run_kills_silent_assembler() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("assembled");
        let slow = dir.path().join("slow.sh");
        std::fs::write(&slow, format!("sleep 0.5\necho ran >> {}\n", marker.display())).unwrap();
        let binary = dump_script(dir.path(), DUMP);
        let mut session = Session::new(toolchain("sh", "sh")).unwrap();

        session.begin_run();
        session.start(Job {
            source: Some(slow),
            binary: dir.path().join("slow.bin"),
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
        session.load_binary(&binary);
        session.wait(|_| {});
        std::thread::sleep(std::time::Duration::from_millis(800));

        assert_eq!(session.status(), &Status::Complete);
        assert_eq!(session.registers().pc(), "0x0004");
        assert!(!marker.exists());
    }

    #[test]
    fn test_launch_failure_is_reported_as_output() {
        let mut session = Session::new(toolchain("/nonexistent/z16asm", "sh")).unwrap();
        session.run_source("ecall 10\n").unwrap();
        session.wait(|_| {});

        assert!(matches!(session.status(), Status::Error(_)));
        assert!(session.output()[0].contains("/nonexistent/z16asm"));
        assert_eq!(session.registers(), &RegisterTable::new());
    }

    #[test]
    fn test_source_is_written_and_passed_to_simulator() {
        let mut session = Session::new(toolchain("true", "echo")).unwrap();
        session.run_source("li a0 1\n").unwrap();

        let mut streamed = Vec::new();
        session.wait(|line| streamed.push(line.to_string()));

        let binary = session.last_binary().unwrap().to_path_buf();
        assert_eq!(streamed, vec![binary.display().to_string()]);
        assert_eq!(binary.file_name().unwrap(), config::BINARY_FILE_NAME);
        assert!(binary.starts_with(session.workspace.path()));
        let written = std::fs::read_to_string(binary.with_file_name(config::SOURCE_FILE_NAME)).unwrap();
        assert_eq!(written, "li a0 1\n");
        assert_eq!(session.status(), &Status::Complete);
    }

    #[test]
    fn test_each_run_gets_its_own_directory() {
        let mut session = Session::new(toolchain("true", "true")).unwrap();
        session.run_source("ecall 10\n").unwrap();
        session.wait(|_| {});
        let first = session.last_binary().unwrap().to_path_buf();
        session.run_source("ecall 10\n").unwrap();
        session.wait(|_| {});

        assert_ne!(session.last_binary(), Some(first.as_path()));
    }

    #[test]
    fn test_assembler_error_lines_are_collected() {
        let mut session = Session::new(toolchain("true", "true")).unwrap();
        session.begin_run();
        session.apply(RunEvent::Output(Stage::Assemble, b"Error on line 4: bad register\nok\nerror at ".to_vec()));
        session.apply(RunEvent::Output(Stage::Assemble, b"line 9".to_vec()));
        session.finish_run();

        assert_eq!(session.error_lines(), [4, 9]);
        assert_eq!(session.output().len(), 3);
    }

    #[test]
    fn test_new_run_discards_partial_state() {
        let mut session = Session::new(toolchain("true", "true")).unwrap();
        session.apply(RunEvent::Started(Stage::Simulate));
        session.apply(RunEvent::Output(Stage::Simulate, b"--- Final Register State ---\nt0 (x0): 0x00".to_vec()));

        session.begin_run();
        session.apply(RunEvent::Started(Stage::Simulate));
        session.apply(RunEvent::Output(Stage::Simulate, b"FF (255)\n".to_vec()));
        session.finish_run();

        assert_eq!(session.registers().get("t0"), Some("0x0000"));
        assert_eq!(session.output(), ["FF (255)"]);
    }
}
