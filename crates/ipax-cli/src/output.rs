use std::io::{self, Write};

use ipax_core::{LogLevel, LogLine, LogSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

/// Where a line goes and how it reads. Remote stdout stays bare so it can be
/// piped; everything else is tagged on stderr.
pub(crate) fn render(line: &LogLine, verbose: bool) -> Option<(Stream, String)> {
    match line.level {
        LogLevel::Command if !verbose => None,
        LogLevel::Stdout => Some((Stream::Stdout, line.text.clone())),
        LogLevel::Stderr | LogLevel::Heading => Some((Stream::Stderr, line.text.clone())),
        level => Some((Stream::Stderr, format!("[{}] {}", level.tag(), line.text))),
    }
}

pub(crate) struct TerminalSink {
    pub(crate) verbose: bool,
    /// Remote stdout is echoed unless the command prints its own summary.
    pub(crate) echo_stdout: bool,
    progress_open: bool,
}

impl TerminalSink {
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            verbose,
            echo_stdout: true,
            progress_open: false,
        }
    }

    /// Ends a `\r`-redrawn progress line so the next message starts clean.
    pub(crate) fn finish_progress(&mut self) {
        if self.progress_open {
            eprintln!();
            self.progress_open = false;
        }
    }
}

impl LogSink for TerminalSink {
    fn line(&mut self, line: LogLine) {
        if line.level == LogLevel::Stdout && !self.echo_stdout {
            return;
        }
        let Some((stream, text)) = render(&line, self.verbose) else {
            return;
        };
        self.finish_progress();
        match stream {
            Stream::Stdout => println!("{text}"),
            Stream::Stderr => eprintln!("{text}"),
        }
    }

    fn progress(&mut self, percent: u8) {
        let mut err = io::stderr().lock();
        let _ = write!(err, "\r{percent:>3}%");
        let _ = err.flush();
        self.progress_open = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines_need_verbose() {
        let line = LogLine::command("Executing command: ssh -p 22 root@h 'echo Connected'");
        assert_eq!(render(&line, false), None);
        assert_eq!(
            render(&line, true),
            Some((
                Stream::Stderr,
                "[command] Executing command: ssh -p 22 root@h 'echo Connected'".to_string()
            ))
        );
    }

    #[test]
    fn remote_stdout_is_bare_on_stdout() {
        let line = LogLine::new(LogLevel::Stdout, "IPA: App.ipa");
        assert_eq!(
            render(&line, false),
            Some((Stream::Stdout, "IPA: App.ipa".to_string()))
        );
        let warning = LogLine::warning("careful");
        assert_eq!(
            render(&warning, false),
            Some((Stream::Stderr, "[warning] careful".to_string()))
        );
    }
}
