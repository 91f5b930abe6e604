//! External process execution with live streaming and buffered capture.
//!
//! Every provisioning, identity, registry and secret-store call goes through a
//! [`CommandRunner`]. The production implementation is [`ProcessRunner`]; stages
//! accept `&dyn CommandRunner` so they can be driven by scripted runners in tests.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use serde::Serialize;

use crate::error::{Error, ProcessFailedDetails, Result};
use crate::utils::{command, shell};

/// Options whose value is a secret and never appears in logs or errors.
const SECRET_OPTIONS: [&str; 1] = ["--value"];
const REDACTED: &str = "***";

/// Controls when captured output reaches the operator's terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Forward each line as it arrives (it is still buffered).
    #[default]
    Always,
    /// Stay quiet while running; replay stdout then stderr if the exit code is nonzero.
    OnError,
    /// Never forward. Failures still carry the buffered text.
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Destination for forwarded and replayed command output.
pub trait OutputSink: Send + Sync {
    fn write(&self, stream: Stream, text: &str);
}

/// Writes to this process's own stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct Terminal;

impl OutputSink for Terminal {
    fn write(&self, stream: Stream, text: &str) {
        // A closed terminal must not abort the command being drained.
        match stream {
            Stream::Stdout => {
                let mut handle = io::stdout().lock();
                let _ = handle.write_all(text.as_bytes());
                let _ = handle.flush();
            }
            Stream::Stderr => {
                let mut handle = io::stderr().lock();
                let _ = handle.write_all(text.as_bytes());
                let _ = handle.flush();
            }
        }
    }
}

/// An argument vector plus the directory and environment it runs with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Environment entries scoped to this single invocation.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Argv with secret-bearing option values masked, for logs and errors.
    pub fn redacted_argv(&self) -> Vec<String> {
        let mut argv = self.argv();
        let mut mask_next = false;
        for arg in argv.iter_mut() {
            if mask_next {
                *arg = REDACTED.to_string();
                mask_next = false;
                continue;
            }
            if SECRET_OPTIONS.contains(&arg.as_str()) {
                mask_next = true;
            } else if let Some((flag, _)) = arg.split_once('=') {
                if SECRET_OPTIONS.contains(&flag) {
                    *arg = format!("{}={}", flag, REDACTED);
                }
            }
        }
        argv
    }

    pub fn display(&self) -> String {
        shell::quote_args(&self.redacted_argv())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub capture: bool,
    pub check: bool,
    pub echo: EchoPolicy,
}

impl RunOptions {
    /// Output goes straight to the terminal; nothing is buffered.
    pub fn streamed() -> Self {
        Self {
            capture: false,
            check: true,
            echo: EchoPolicy::Always,
        }
    }

    pub fn captured(echo: EchoPolicy) -> Self {
        Self {
            capture: true,
            check: true,
            echo,
        }
    }

    /// Return nonzero exits as output instead of `process.failed`.
    pub fn unchecked(mut self) -> Self {
        self.check = false;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::streamed()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec, options: RunOptions) -> Result<CommandOutput>;
}

/// Runs real child processes.
#[derive(Clone)]
pub struct ProcessRunner {
    sink: Arc<dyn OutputSink>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(Terminal))
    }

    pub fn with_sink(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }

    fn run_streamed(&self, spec: &CommandSpec, options: RunOptions) -> Result<CommandOutput> {
        let status = build_command(spec)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(spec, e))?;

        let output = CommandOutput {
            args: spec.argv(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: status.code().unwrap_or(-1),
        };
        finish(spec, output, options.check)
    }

    fn run_captured(&self, spec: &CommandSpec, options: RunOptions) -> Result<CommandOutput> {
        let mut child = build_command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(spec, e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let live = (options.echo == EchoPolicy::Always).then_some(self.sink.as_ref());

        // Both readers must reach end-of-stream before the exit status counts.
        let (out_lines, err_lines) = thread::scope(|scope| {
            let out = scope.spawn(move || drain(stdout, Stream::Stdout, live));
            let err = scope.spawn(move || drain(stderr, Stream::Stderr, live));
            (out.join(), err.join())
        });

        let status = child
            .wait()
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("wait for {}", spec.program))))?;

        let stdout = joined(out_lines, spec, "stdout")?;
        let stderr = joined(err_lines, spec, "stderr")?;
        let exit_code = status.code().unwrap_or(-1);

        if options.echo == EchoPolicy::OnError && exit_code != 0 {
            if !stdout.is_empty() {
                self.sink.write(Stream::Stdout, &stdout);
            }
            if !stderr.is_empty() {
                self.sink.write(Stream::Stderr, &stderr);
            }
        }

        finish(
            spec,
            CommandOutput {
                args: spec.argv(),
                stdout,
                stderr,
                exit_code,
            },
            options.check,
        )
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec, options: RunOptions) -> Result<CommandOutput> {
        log_status!("exec", "$ {}", spec.display());
        if options.capture {
            self.run_captured(spec, options)
        } else {
            self.run_streamed(spec, options)
        }
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd
}

fn spawn_error(spec: &CommandSpec, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::tool_not_found(&spec.program)
    } else {
        Error::internal_io(err.to_string(), Some(format!("spawn {}", spec.program)))
    }
}

/// Read complete lines (newline included) until end-of-stream.
fn drain<R: Read>(
    stream: Option<R>,
    which: Stream,
    echo: Option<&dyn OutputSink>,
) -> io::Result<Vec<String>> {
    let Some(stream) = stream else {
        return Ok(Vec::new());
    };

    let mut reader = BufReader::new(stream);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if let Some(sink) = echo {
            sink.write(which, &line);
        }
        lines.push(line);
    }
    Ok(lines)
}

fn joined(
    lines: thread::Result<io::Result<Vec<String>>>,
    spec: &CommandSpec,
    stream: &str,
) -> Result<String> {
    match lines {
        Ok(Ok(lines)) => Ok(lines.concat()),
        Ok(Err(e)) => Err(Error::internal_io(
            e.to_string(),
            Some(format!("read {} of {}", stream, spec.program)),
        )),
        Err(_) => Err(Error::internal_unexpected(format!(
            "{} reader for {} panicked",
            stream, spec.program
        ))),
    }
}

fn finish(spec: &CommandSpec, output: CommandOutput, check: bool) -> Result<CommandOutput> {
    if check && !output.success() {
        return Err(Error::process_failed(ProcessFailedDetails {
            command: spec.redacted_argv(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }));
    }
    Ok(output)
}

/// Fail with `tool.not_found` unless every binary resolves on PATH.
pub fn require_binaries(binaries: &[&str]) -> Result<()> {
    for binary in binaries {
        if command::find_on_path(binary).is_none() {
            return Err(Error::tool_not_found(*binary));
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<(Stream, String)>>,
    }

    impl RecordingSink {
        fn writes(&self) -> Vec<(Stream, String)> {
            self.writes.lock().unwrap().clone()
        }

        fn text(&self) -> String {
            self.writes().into_iter().map(|(_, t)| t).collect()
        }
    }

    impl OutputSink for RecordingSink {
        fn write(&self, stream: Stream, text: &str) {
            self.writes.lock().unwrap().push((stream, text.to_string()));
        }
    }

    fn recording_runner() -> (ProcessRunner, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (ProcessRunner::with_sink(sink.clone()), sink)
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    #[test]
    fn on_error_replays_stdout_block_then_stderr_block() {
        let (runner, sink) = recording_runner();
        let err = runner
            .run(
                &sh("printf 'A\\n'; printf 'B\\n' >&2; exit 3"),
                RunOptions::captured(EchoPolicy::OnError),
            )
            .unwrap_err();

        assert_eq!(sink.text(), "A\nB\n");
        assert_eq!(
            sink.writes(),
            vec![
                (Stream::Stdout, "A\n".to_string()),
                (Stream::Stderr, "B\n".to_string())
            ]
        );

        let details = err.process_details().unwrap();
        assert_eq!(details.exit_code, 3);
        assert_eq!(details.stdout, "A\n");
        assert_eq!(details.stderr, "B\n");
    }

    #[test]
    fn on_error_stays_quiet_on_success() {
        let (runner, sink) = recording_runner();
        let output = runner
            .run(&sh("echo hello; echo warn >&2"), RunOptions::captured(EchoPolicy::OnError))
            .unwrap();

        assert!(sink.writes().is_empty());
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "warn\n");
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.args, vec!["sh", "-c", "echo hello; echo warn >&2"]);
    }

    #[test]
    fn never_suppresses_forwarding_but_failure_keeps_text() {
        let (runner, sink) = recording_runner();
        let err = runner
            .run(&sh("echo out; echo err >&2; exit 2"), RunOptions::captured(EchoPolicy::Never))
            .unwrap_err();

        assert!(sink.writes().is_empty());
        assert_eq!(err.code, ErrorCode::ProcessFailed);
        let details = err.process_details().unwrap();
        assert_eq!(details.stdout, "out\n");
        assert_eq!(details.stderr, "err\n");
    }

    #[test]
    fn always_forwards_each_line_to_its_stream() {
        let (runner, sink) = recording_runner();
        let output = runner
            .run(
                &sh("echo one; echo two >&2; echo three"),
                RunOptions::captured(EchoPolicy::Always),
            )
            .unwrap();

        let stdout: Vec<String> = sink
            .writes()
            .into_iter()
            .filter(|(s, _)| *s == Stream::Stdout)
            .map(|(_, t)| t)
            .collect();
        let stderr: Vec<String> = sink
            .writes()
            .into_iter()
            .filter(|(s, _)| *s == Stream::Stderr)
            .map(|(_, t)| t)
            .collect();

        assert_eq!(stdout, vec!["one\n", "three\n"]);
        assert_eq!(stderr, vec!["two\n"]);
        assert_eq!(output.stdout, "one\nthree\n");
    }

    #[test]
    fn captured_output_is_complete_for_large_streams() {
        let (runner, _sink) = recording_runner();
        let output = runner
            .run(
                &sh("i=0; while [ $i -lt 3000 ]; do echo line$i; echo err$i >&2; i=$((i+1)); done"),
                RunOptions::captured(EchoPolicy::Never),
            )
            .unwrap();

        assert_eq!(output.stdout.lines().count(), 3000);
        assert_eq!(output.stderr.lines().count(), 3000);
        assert!(output.stdout.ends_with("line2999\n"));
    }

    #[test]
    fn final_partial_line_is_kept() {
        let (runner, _sink) = recording_runner();
        let output = runner
            .run(&sh("printf 'a\\nno-newline'"), RunOptions::captured(EchoPolicy::Never))
            .unwrap();
        assert_eq!(output.stdout, "a\nno-newline");
    }

    #[test]
    fn unchecked_returns_nonzero_exit() {
        let (runner, sink) = recording_runner();
        let output = runner
            .run(&sh("echo x; exit 5"), RunOptions::captured(EchoPolicy::OnError).unchecked())
            .unwrap();

        assert_eq!(output.exit_code, 5);
        assert!(!output.success());
        // Replay still happens; only the failure check is disabled.
        assert_eq!(sink.text(), "x\n");
    }

    #[test]
    fn streamed_failure_reports_exit_code() {
        let (runner, _sink) = recording_runner();
        let err = runner.run(&sh("exit 4"), RunOptions::streamed()).unwrap_err();
        assert_eq!(err.process_details().unwrap().exit_code, 4);

        let output = runner
            .run(&sh("exit 4"), RunOptions::streamed().unchecked())
            .unwrap();
        assert_eq!(output.exit_code, 4);
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn env_and_cwd_are_scoped_to_the_invocation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();

        let (runner, _sink) = recording_runner();
        let output = runner
            .run(
                &sh("test -f marker && printf '%s' \"$STACKOPS_PROBE\"")
                    .cwd(dir.path())
                    .envs([("STACKOPS_PROBE", "scoped")]),
                RunOptions::captured(EchoPolicy::Never),
            )
            .unwrap();

        assert_eq!(output.stdout, "scoped");
        assert!(std::env::var("STACKOPS_PROBE").is_err());
    }

    #[test]
    fn missing_program_is_tool_not_found() {
        let (runner, _sink) = recording_runner();
        let err = runner
            .run(
                &CommandSpec::new("stackops-definitely-missing-binary"),
                RunOptions::captured(EchoPolicy::Never),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolNotFound);
    }

    #[test]
    fn require_binaries_checks_path() {
        assert!(require_binaries(&["sh"]).is_ok());
        let err = require_binaries(&["sh", "stackops-definitely-missing-binary"]).unwrap_err();
        assert_eq!(err.code.as_str(), "tool.not_found");
    }

    #[test]
    fn secret_values_are_masked_in_display_and_failures() {
        let spec = CommandSpec::new("az").args([
            "keyvault", "secret", "set", "--name", "s", "--value", "alice:hunter2",
        ]);
        assert_eq!(
            spec.display(),
            "az keyvault secret set --name s --value '***'"
        );
        assert_eq!(spec.argv()[6], "alice:hunter2");
        assert_eq!(
            CommandSpec::new("az").arg("--value=hunter2").redacted_argv(),
            vec!["az", "--value=***"]
        );

        let (runner, _sink) = recording_runner();
        let err = runner
            .run(
                &sh("exit 1").args(["sh", "--value", "hunter2"]),
                RunOptions::captured(EchoPolicy::Never),
            )
            .unwrap_err();
        assert!(!err.message.contains("hunter2"));
        assert_eq!(
            err.process_details().unwrap().command,
            vec!["sh", "-c", "exit 1", "sh", "--value", "***"]
        );
    }

    #[test]
    fn display_quotes_arguments() {
        let spec = CommandSpec::new("terraform").args(["plan", "-var-file=dev.tfvars", "a b"]);
        assert_eq!(spec.display(), "terraform plan -var-file=dev.tfvars 'a b'");
    }
}
