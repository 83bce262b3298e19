use crate::command::Action;
use crate::extraction::detect_ipa_name;
use crate::log::LogLine;
use crate::profile::BUNDLE_ROOT;
use crate::runner::RunOutcome;
use crate::session::LinkState;

#[derive(Clone, Copy, Debug, Default)]
pub struct HintContext {
    pub sshpass_available: bool,
    pub password_given: bool,
}

impl HintContext {
    fn password_prompt_warning(self) -> Option<LogLine> {
        if !self.sshpass_available && self.password_given {
            Some(LogLine::warning(
                "Warning: sshpass not installed, the password might be requested on the terminal instead.",
            ))
        } else {
            None
        }
    }
}

pub fn heading(action: Action) -> LogLine {
    let text = match action {
        Action::Probe => "--- Connection Test ---",
        Action::ListBundles => "--- Bundle List ---",
        Action::Transfer => "--- Script Transfer ---",
        Action::Execute => "--- Script Execution Output ---",
        Action::Download => "--- IPA Download ---",
    };
    LogLine::heading(text)
}

/// Lines describing how an action ended: a success message or the exit code
/// followed by the first matching hint.
pub fn outcome_report(action: Action, outcome: &RunOutcome, ctx: HintContext) -> Vec<LogLine> {
    match action {
        Action::Probe => probe_report(outcome, ctx),
        Action::ListBundles => bundles_report(outcome, ctx),
        Action::Transfer => transfer_report(outcome, ctx),
        Action::Execute => execute_report(outcome, ctx),
        Action::Download => download_report(outcome),
    }
}

fn probe_report(outcome: &RunOutcome, ctx: HintContext) -> Vec<LogLine> {
    let link = LinkState::from_probe(outcome);
    if link.is_connected() {
        return vec![LogLine::success(format!(
            "SSH connection successful! (Time: {:.2}s)",
            outcome.elapsed.as_secs_f64()
        ))];
    }
    let mut lines = vec![
        LogLine::error(format!(
            "SSH connection failed with code {}.",
            outcome.exit_code
        )),
        LogLine::error(
            "Please check IP, username, password, and that OpenSSH is installed on the device.",
        ),
    ];
    if outcome.stderr.contains("Permission denied") {
        lines.push(LogLine::error("Access denied. Check username and password."));
    } else if outcome.stderr.contains("Connection refused")
        || outcome.stderr.contains("Host unreachable")
        || outcome.stderr.contains("No route to host")
    {
        lines.push(LogLine::error(
            "Connection refused or host unreachable. Check IP and network.",
        ));
    } else if outcome.stderr.contains("timed out") {
        lines.push(LogLine::error(
            "Connection timed out. Check that the device is awake and on the same network.",
        ));
    } else if let Some(warning) = ctx.password_prompt_warning() {
        lines.push(warning);
    }
    lines
}

fn bundles_report(outcome: &RunOutcome, ctx: HintContext) -> Vec<LogLine> {
    if outcome.success() {
        return vec![LogLine::success("Bundle list retrieved successfully!")];
    }
    let mut lines = vec![
        LogLine::error(format!(
            "Failed to retrieve bundle list with code {}.",
            outcome.exit_code
        )),
        LogLine::error(
            "Please ensure IP, username, and password are correct, and OpenSSH is installed on the device.",
        ),
    ];
    if outcome.stderr.contains("Permission denied") {
        lines.push(LogLine::error("Access denied. Check username and password."));
    } else if outcome.stderr.contains("No such file or directory") {
        lines.push(LogLine::error(format!(
            "Directory '{BUNDLE_ROOT}' not found on the device."
        )));
    } else if let Some(warning) = ctx.password_prompt_warning() {
        lines.push(warning);
    }
    lines
}

fn transfer_report(outcome: &RunOutcome, ctx: HintContext) -> Vec<LogLine> {
    if outcome.success() {
        return vec![LogLine::success("Script transferred successfully!")];
    }
    let mut lines = vec![
        LogLine::error(format!(
            "Script transfer failed with code {}.",
            outcome.exit_code
        )),
        LogLine::error(
            "Please ensure IP, username, password are correct, and OpenSSH is installed on the device.",
        ),
    ];
    if outcome.stderr.contains("Permission denied") {
        lines.push(LogLine::error("Access denied. Check username and password."));
    } else if outcome.stderr.contains("No such file or directory") {
        lines.push(LogLine::error(
            "Destination directory on the device not found. Check the script path on the device.",
        ));
    } else if let Some(warning) = ctx.password_prompt_warning() {
        lines.push(warning);
    }
    lines
}

fn execute_report(outcome: &RunOutcome, ctx: HintContext) -> Vec<LogLine> {
    if outcome.success() {
        let mut lines = vec![
            LogLine::success("Script executed successfully on the device!"),
            LogLine::success(
                "The .ipa file should have been created in the same directory as the script on the device.",
            ),
        ];
        match detect_ipa_name(&outcome.stdout) {
            Some(name) => lines.push(LogLine::success(format!("Detected IPA filename: {name}"))),
            None => lines.push(LogLine::warning(
                "Warning: Could not automatically detect IPA filename from script output.",
            )),
        }
        return lines;
    }
    let mut lines = vec![
        LogLine::error(format!(
            "Script execution failed with code {}.",
            outcome.exit_code
        )),
        LogLine::error("Please check IP, username, password, and script/bundle path on the device."),
    ];
    if outcome.stderr.contains("Permission denied") {
        lines.push(LogLine::error(
            "Access denied. Check username/password or script file permissions on the device.",
        ));
    } else if outcome.stderr.contains("command not found") {
        lines.push(LogLine::error(
            "A required command was not found on this computer, or the script was not found on the device.",
        ));
    } else if outcome
        .stdout
        .contains("Error: application bundle directory DOES NOT exists.")
        || outcome
            .stdout
            .contains("Error: application .app directory DOES NOT exists.")
    {
        lines.push(LogLine::error(
            "Application bundle path on the device is incorrect or does not exist.",
        ));
    } else if let Some(warning) = ctx.password_prompt_warning() {
        lines.push(warning);
    }
    lines
}

fn download_report(outcome: &RunOutcome) -> Vec<LogLine> {
    if outcome.success() {
        return vec![LogLine::success("IPA file downloaded successfully!")];
    }
    let mut lines = vec![
        LogLine::error(format!(
            "IPA download failed with code {}.",
            outcome.exit_code
        )),
        LogLine::error("Please check if the IPA file exists on the device and paths are correct."),
    ];
    if outcome.stderr.contains("No such file or directory") {
        lines.push(LogLine::error(
            "IPA file not found on the device at the specified path.",
        ));
    } else if outcome.stderr.contains("Permission denied") {
        lines.push(LogLine::error(
            "Permission denied when accessing the IPA on the device.",
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::log::LogLevel;

    fn failed(stdout: &str, stderr: &str) -> RunOutcome {
        RunOutcome {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: 255,
            elapsed: Duration::from_millis(40),
        }
    }

    fn texts(lines: &[LogLine]) -> Vec<&str> {
        lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn probe_success_reports_elapsed_time() {
        let outcome = RunOutcome {
            stdout: "Connected\n".into(),
            stderr: String::new(),
            exit_code: 0,
            elapsed: Duration::from_millis(420),
        };
        let lines = outcome_report(Action::Probe, &outcome, HintContext::default());
        assert_eq!(texts(&lines), vec!["SSH connection successful! (Time: 0.42s)"]);
        assert_eq!(lines[0].level, LogLevel::Success);
    }

    #[test]
    fn probe_failure_picks_first_matching_hint() {
        let outcome = failed("", "root@10.0.0.2: Permission denied (publickey,password).");
        let lines = outcome_report(Action::Probe, &outcome, HintContext::default());
        assert_eq!(lines[0].text, "SSH connection failed with code 255.");
        assert_eq!(
            lines.last().unwrap().text,
            "Access denied. Check username and password."
        );
        assert!(lines.iter().all(|line| line.level == LogLevel::Error));
    }

    #[test]
    fn probe_failure_hints_network_problems() {
        let last = |stderr: &str| {
            outcome_report(Action::Probe, &failed("", stderr), HintContext::default())
                .pop()
                .unwrap()
                .text
        };
        let unreachable = "Connection refused or host unreachable. Check IP and network.";
        assert_eq!(
            last("ssh: connect to host 10.0.0.2 port 22: Connection refused"),
            unreachable
        );
        assert_eq!(
            last("ssh: connect to host 10.0.0.2 port 22: No route to host"),
            unreachable
        );
        assert_eq!(
            last("ssh: connect to host 10.0.0.2 port 22: Connection timed out"),
            "Connection timed out. Check that the device is awake and on the same network."
        );
    }

    #[test]
    fn missing_sshpass_warning_only_without_specific_hint() {
        let ctx = HintContext {
            sshpass_available: false,
            password_given: true,
        };
        let lines = outcome_report(Action::ListBundles, &failed("", "mystery"), ctx);
        assert_eq!(lines.last().unwrap().level, LogLevel::Warning);

        let lines = outcome_report(
            Action::ListBundles,
            &failed("", "ls: No such file or directory"),
            ctx,
        );
        assert!(lines
            .last()
            .unwrap()
            .text
            .contains("/var/containers/Bundle/Application/"));
    }

    #[test]
    fn execute_reports_script_bundle_errors_from_stdout() {
        let outcome = failed("Error: application bundle directory DOES NOT exists.\n", "");
        let lines = outcome_report(Action::Execute, &outcome, HintContext::default());
        assert_eq!(
            lines.last().unwrap().text,
            "Application bundle path on the device is incorrect or does not exist."
        );
    }

    #[test]
    fn execute_failure_hints_app_dir_and_missing_command() {
        let outcome = failed("Error: application .app directory DOES NOT exists.\n", "");
        let lines = outcome_report(Action::Execute, &outcome, HintContext::default());
        assert_eq!(
            lines.last().unwrap().text,
            "Application bundle path on the device is incorrect or does not exist."
        );

        let outcome = failed("", "sh: ./extract-ipa.sh: command not found");
        let lines = outcome_report(Action::Execute, &outcome, HintContext::default());
        assert_eq!(
            lines.last().unwrap().text,
            "A required command was not found on this computer, or the script was not found on the device."
        );
    }

    #[test]
    fn execute_success_mentions_detected_name() {
        let outcome = RunOutcome {
            stdout: "IPA: Foo.ipa\n".into(),
            stderr: String::new(),
            exit_code: 0,
            elapsed: Duration::from_secs(3),
        };
        let lines = outcome_report(Action::Execute, &outcome, HintContext::default());
        assert_eq!(lines.last().unwrap().text, "Detected IPA filename: Foo.ipa");

        let outcome = RunOutcome {
            stdout: "done\n".into(),
            ..outcome
        };
        let lines = outcome_report(Action::Execute, &outcome, HintContext::default());
        assert_eq!(lines.last().unwrap().level, LogLevel::Warning);
    }

    #[test]
    fn download_failure_hints_missing_file() {
        let lines = outcome_report(
            Action::Download,
            &failed("", "rsync: link_stat \"/x.ipa\" failed: No such file or directory (2)"),
            HintContext::default(),
        );
        assert_eq!(
            lines.last().unwrap().text,
            "IPA file not found on the device at the specified path."
        );
    }
}
