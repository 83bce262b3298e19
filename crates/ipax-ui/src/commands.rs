use std::path::PathBuf;

use ipax_core::{Action, ConnectionProfile, LogLine, RunOutcome, ScriptSource, ToolAvailability};

#[derive(Debug)]
pub(crate) enum UiCommand {
    DetectTools,
    Probe {
        profile: ConnectionProfile,
    },
    ListBundles {
        profile: ConnectionProfile,
    },
    /// Uploads the script first when it lives on this computer.
    RunScript {
        profile: ConnectionProfile,
        source: ScriptSource,
        bundle: String,
    },
    Download {
        profile: ConnectionProfile,
        remote_ipa: String,
        local_path: PathBuf,
    },
}

impl UiCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            UiCommand::DetectTools => "detect_tools",
            UiCommand::Probe { .. } => "probe",
            UiCommand::ListBundles { .. } => "list_bundles",
            UiCommand::RunScript { .. } => "run_script",
            UiCommand::Download { .. } => "download",
        }
    }
}

#[derive(Debug)]
pub(crate) enum AppEvent {
    Log { line: LogLine },
    Tools { tools: ToolAvailability },
    Progress { percent: u8 },
    Finished { action: Action, outcome: RunOutcome },
    /// The tool could not be spawned at all.
    Failed { action: Action, message: String },
}
