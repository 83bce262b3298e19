use std::{
    io,
    process::Stdio,
    sync::OnceLock,
    time::{Duration, Instant},
};

use regex::Regex;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc,
};
use tracing::{info, warn};

use crate::command::RemoteCommand;
use crate::error::ToolError;
use crate::log::{LogLevel, LogLine, LogSink};
use crate::tools::Tool;

const CHUNK_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

struct Chunk {
    stream: Stream,
    text: String,
    terminator: Option<&'static str>,
}

/// Spawns `cmd`, forwards its output to `sink` as it arrives and waits for it
/// to exit.
pub async fn run(cmd: &RemoteCommand, sink: &mut dyn LogSink) -> Result<RunOutcome, ToolError> {
    let shown = cmd.display();
    sink.line(LogLine::command(format!("Executing command: {shown}")));
    info!(action = cmd.action.name(), command = %shown, "spawning");

    let started = Instant::now();
    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| spawn_error(cmd, err))?;

    let (tx, mut rx) = mpsc::channel::<Chunk>(CHUNK_CHANNEL_CAPACITY);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_chunks(stdout, Stream::Stdout, cmd.track_progress, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_chunks(stderr, Stream::Stderr, false, tx.clone()));
    }
    drop(tx);

    let mut stdout = String::new();
    let mut stderr = String::new();
    while let Some(chunk) = rx.recv().await {
        let buffer = match chunk.stream {
            Stream::Stdout => &mut stdout,
            Stream::Stderr => &mut stderr,
        };
        buffer.push_str(&chunk.text);
        if let Some(term) = chunk.terminator {
            buffer.push_str(term);
        }

        if cmd.track_progress && chunk.stream == Stream::Stdout {
            if let Some(percent) = parse_progress(&chunk.text) {
                sink.progress(percent);
            }
            // rsync redraws its progress line with carriage returns.
            if chunk.terminator == Some("\r") {
                continue;
            }
        }
        let level = match chunk.stream {
            Stream::Stdout => LogLevel::Stdout,
            Stream::Stderr => LogLevel::Stderr,
        };
        sink.line(LogLine::new(level, chunk.text));
    }

    let status = child.wait().await.map_err(|err| ToolError::Io {
        program: cmd.program.display().to_string(),
        message: err.to_string(),
    })?;

    Ok(RunOutcome {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(-1),
        elapsed: started.elapsed(),
    })
}

fn spawn_error(cmd: &RemoteCommand, err: io::Error) -> ToolError {
    let program = cmd.program.display().to_string();
    warn!(program = %program, error = %err, "failed to spawn");
    if err.kind() == io::ErrorKind::NotFound {
        let env_key = [Tool::Sshpass, Tool::Ssh, Tool::Scp, Tool::Rsync]
            .into_iter()
            .find(|tool| tool.path() == cmd.program)
            .map(Tool::env_key)
            .unwrap_or("PATH");
        ToolError::NotFound { program, env_key }
    } else {
        ToolError::Io {
            program,
            message: err.to_string(),
        }
    }
}

async fn read_chunks<R>(reader: R, stream: Stream, split_cr: bool, tx: mpsc::Sender<Chunk>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut splitter = LineSplitter::new(split_cr);
    loop {
        let (ready, consumed) = match reader.fill_buf().await {
            Ok([]) => break,
            Ok(available) => (splitter.push(available), available.len()),
            Err(_) => break,
        };
        reader.consume(consumed);
        for (text, terminator) in ready {
            let chunk = Chunk {
                stream,
                text,
                terminator: Some(terminator),
            };
            if tx.send(chunk).await.is_err() {
                return;
            }
        }
    }
    if let Some((text, terminator)) = splitter.finish() {
        let chunk = Chunk {
            stream,
            text,
            terminator,
        };
        let _ = tx.send(chunk).await;
    }
}

/// Cuts a byte stream into lines. `\r\n` and `\n` always end a line; a bare
/// `\r` ends one only when `split_cr` is set. Invalid UTF-8 is replaced.
struct LineSplitter {
    pending: Vec<u8>,
    pending_cr: bool,
    split_cr: bool,
}

impl LineSplitter {
    fn new(split_cr: bool) -> Self {
        Self {
            pending: Vec::new(),
            pending_cr: false,
            split_cr,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<(String, &'static str)> {
        let mut ready = Vec::new();
        for &byte in bytes {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    ready.push((self.take(), "\r\n"));
                    continue;
                }
                if self.split_cr {
                    ready.push((self.take(), "\r"));
                } else {
                    self.pending.push(b'\r');
                }
            }
            match byte {
                b'\n' => ready.push((self.take(), "\n")),
                b'\r' => self.pending_cr = true,
                _ => self.pending.push(byte),
            }
        }
        ready
    }

    /// Whatever is left once the stream closes.
    fn finish(&mut self) -> Option<(String, Option<&'static str>)> {
        if self.pending_cr {
            self.pending_cr = false;
            if self.split_cr {
                return Some((self.take(), Some("\r")));
            }
            self.pending.push(b'\r');
        }
        if self.pending.is_empty() {
            None
        } else {
            Some((self.take(), None))
        }
    }

    fn take(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// First `NN%` in a line, clamped to 100.
pub fn parse_progress(line: &str) -> Option<u8> {
    static PERCENT: OnceLock<Regex> = OnceLock::new();
    let re = PERCENT.get_or_init(|| Regex::new(r"(\d+)%").expect("valid percent regex"));
    let caps = re.captures(line)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::command::Action;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<LogLine>,
        progress: Vec<u8>,
    }

    impl LogSink for Recorder {
        fn line(&mut self, line: LogLine) {
            self.lines.push(line);
        }

        fn progress(&mut self, percent: u8) {
            self.progress.push(percent);
        }
    }

    fn sh(script: &str, track_progress: bool) -> RemoteCommand {
        RemoteCommand {
            action: Action::Execute,
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            env: Vec::new(),
            track_progress,
        }
    }

    #[test]
    fn parse_progress_reads_rsync_progress2_lines() {
        assert_eq!(
            parse_progress("     32,768  42%   31.25MB/s    0:00:00 (xfr#1, to-chk=0/1)"),
            Some(42)
        );
        assert_eq!(parse_progress("sending incremental file list"), None);
        assert_eq!(parse_progress("999%"), Some(100));
    }

    #[test]
    fn splitter_keeps_partial_tail() {
        let mut splitter = LineSplitter::new(true);
        assert_eq!(
            splitter.push(b"a\rb\nc"),
            vec![("a".to_string(), "\r"), ("b".to_string(), "\n")]
        );
        assert_eq!(splitter.finish(), Some(("c".to_string(), None)));

        let mut splitter = LineSplitter::new(false);
        assert_eq!(splitter.push(b"a\rb\n"), vec![("a\rb".to_string(), "\n")]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn splitter_joins_crlf_across_reads() {
        let mut splitter = LineSplitter::new(true);
        assert!(splitter.push(b"file.ipa\r").is_empty());
        assert_eq!(
            splitter.push(b"\nnext"),
            vec![("file.ipa".to_string(), "\r\n")]
        );

        let mut splitter = LineSplitter::new(false);
        assert_eq!(
            splitter.push(b"dos line\r\n"),
            vec![("dos line".to_string(), "\r\n")]
        );
    }

    #[tokio::test]
    async fn run_streams_both_streams_and_reports_exit_code() {
        let cmd = sh("echo out-1; echo err-1 >&2; echo out-2; exit 3", false);
        let mut sink = Recorder::default();

        let outcome = run(&cmd, &mut sink).await.unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
        assert_eq!(outcome.stdout, "out-1\nout-2\n");
        assert_eq!(outcome.stderr, "err-1\n");
        assert_eq!(sink.lines[0].level, LogLevel::Command);
        assert!(sink.lines[0].text.starts_with("Executing command: sh -c"));

        assert_eq!(stdout_lines(&sink), vec!["out-1", "out-2"]);
        assert!(sink
            .lines
            .iter()
            .any(|line| line.level == LogLevel::Stderr && line.text == "err-1"));
    }

    fn stdout_lines(sink: &Recorder) -> Vec<&str> {
        sink.lines
            .iter()
            .filter(|line| line.level == LogLevel::Stdout)
            .map(|line| line.text.as_str())
            .collect()
    }

    #[tokio::test]
    async fn run_logs_blank_and_whitespace_lines() {
        let cmd = sh(r"printf 'a\n\n   \nb\n'", false);
        let mut sink = Recorder::default();

        let outcome = run(&cmd, &mut sink).await.unwrap();

        assert_eq!(outcome.stdout, "a\n\n   \nb\n");
        assert_eq!(stdout_lines(&sink), vec!["a", "", "   ", "b"]);
    }

    #[tokio::test]
    async fn run_logs_crlf_lines_while_tracking_progress() {
        let cmd = sh(r"printf 'file.ipa\r\nsent 10 bytes\r\n'", true);
        let mut sink = Recorder::default();

        let outcome = run(&cmd, &mut sink).await.unwrap();

        assert_eq!(outcome.stdout, "file.ipa\r\nsent 10 bytes\r\n");
        assert_eq!(stdout_lines(&sink), vec!["file.ipa", "sent 10 bytes"]);
        assert!(sink.progress.is_empty());
    }

    #[tokio::test]
    async fn run_replaces_invalid_utf8_instead_of_failing() {
        let cmd = sh(r"printf 'ok\377\n'; printf 'after\n'", false);
        let mut sink = Recorder::default();

        let outcome = run(&cmd, &mut sink).await.unwrap();

        assert!(outcome.success());
        assert_eq!(stdout_lines(&sink), vec!["ok\u{FFFD}", "after"]);
    }

    #[tokio::test]
    async fn run_reports_progress_without_logging_redraws() {
        let cmd = sh(
            r"printf '  10%%\r  55%%\r 100%%\n'; printf 'done'",
            true,
        );
        let mut sink = Recorder::default();

        let outcome = run(&cmd, &mut sink).await.unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.stdout, "  10%\r  55%\r 100%\ndone");
        assert_eq!(sink.progress, vec![10, 55, 100]);
        assert_eq!(stdout_lines(&sink), vec![" 100%", "done"]);
    }

    #[tokio::test]
    async fn run_passes_environment() {
        let mut cmd = sh("echo \"$IPAX_TEST_VALUE\"", false);
        cmd.env
            .push(("IPAX_TEST_VALUE".to_string(), "from-env".to_string()));
        let mut sink = Recorder::default();

        let outcome = run(&cmd, &mut sink).await.unwrap();

        assert_eq!(outcome.stdout, "from-env\n");
        assert!(sink.lines[0].text.contains("IPAX_TEST_VALUE=<redacted>"));
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let cmd = RemoteCommand {
            action: Action::Probe,
            program: PathBuf::from("/nonexistent/ipax-missing-tool"),
            args: Vec::new(),
            env: Vec::new(),
            track_progress: false,
        };
        let mut sink = Vec::new();

        let err = run(&cmd, &mut sink).await.unwrap_err();

        assert!(matches!(err, ToolError::NotFound { env_key: "PATH", .. }));
    }
}
