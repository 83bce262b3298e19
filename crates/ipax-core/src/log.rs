#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    /// The redacted command line about to be spawned; front-ends show it
    /// only in verbose mode.
    Command,
    Heading,
    Stdout,
    Stderr,
}

impl LogLevel {
    pub fn tag(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Command => "command",
            LogLevel::Heading => "heading",
            LogLevel::Stdout => "stdout",
            LogLevel::Stderr => "stderr",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
}

impl LogLine {
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, text)
    }

    pub fn heading(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Heading, text)
    }

    pub fn command(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Command, text)
    }
}

/// Receives the lines and progress updates produced while an action runs.
pub trait LogSink {
    fn line(&mut self, line: LogLine);

    fn progress(&mut self, _percent: u8) {}
}

impl LogSink for Vec<LogLine> {
    fn line(&mut self, line: LogLine) {
        self.push(line);
    }
}
