use ipax_core::diagnostics::{heading, outcome_report, HintContext};
use ipax_core::history::{RunHistory, RunRecord};
use ipax_core::profile::BUNDLE_ROOT;
use ipax_core::{
    run, Action, CommandBuilder, ConnectionProfile, LogLine, LogSink, RemoteCommand, RunOutcome,
    ScriptSource, ToolAvailability, ToolError,
};
use tracing::{info, warn};

use crate::commands::{AppEvent, UiCommand};
use crate::ui_events::UiEventSender;

/// Worker-side copy of what the commands need between runs.
pub(crate) struct WorkerState {
    tools: ToolAvailability,
    history: RunHistory,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            tools: ToolAvailability::default(),
            history: RunHistory::default_location(),
        }
    }
}

struct UiSink<'a> {
    ui: &'a UiEventSender,
}

impl LogSink for UiSink<'_> {
    fn line(&mut self, line: LogLine) {
        self.ui.send(AppEvent::Log { line });
    }

    fn progress(&mut self, percent: u8) {
        self.ui.send(AppEvent::Progress { percent });
    }
}

pub(crate) async fn handle_command(
    cmd: UiCommand,
    state: &mut WorkerState,
    ui: UiEventSender,
) -> Result<(), ToolError> {
    match cmd {
        UiCommand::DetectTools => {
            state.tools = ToolAvailability::detect().await;
            for line in state.tools.report() {
                ui.send(AppEvent::Log { line });
            }
            ui.send(AppEvent::Tools { tools: state.tools });
        }
        UiCommand::Probe { profile } => {
            let cmd = CommandBuilder::new(&profile, state.tools).probe();
            run_action(&cmd, &profile, state, &ui).await?;
        }
        UiCommand::ListBundles { profile } => {
            let cmd = CommandBuilder::new(&profile, state.tools).list_bundles(BUNDLE_ROOT);
            run_action(&cmd, &profile, state, &ui).await?;
        }
        UiCommand::RunScript {
            profile,
            source,
            bundle,
        } => {
            let builder = CommandBuilder::new(&profile, state.tools);
            if let ScriptSource::Local {
                local_path,
                remote_path,
            } = &source
            {
                let transfer = builder.transfer(local_path, remote_path);
                let outcome = run_action(&transfer, &profile, state, &ui).await?;
                if !outcome.success() {
                    return Ok(());
                }
            }
            let execute = builder.execute(source.remote_path(), &bundle);
            run_action(&execute, &profile, state, &ui).await?;
        }
        UiCommand::Download {
            profile,
            remote_ipa,
            local_path,
        } => {
            if !state.tools.rsync {
                ui.send(AppEvent::Log {
                    line: LogLine::warning(
                        "rsync is not installed on this computer. Downloading with scp, without progress display.",
                    ),
                });
            }
            let cmd = CommandBuilder::new(&profile, state.tools).download(&remote_ipa, &local_path);
            run_action(&cmd, &profile, state, &ui).await?;
        }
    }
    Ok(())
}

/// Runs one tool invocation and reports it. A spawn failure is reported as
/// `AppEvent::Failed` and also returned.
async fn run_action(
    cmd: &RemoteCommand,
    profile: &ConnectionProfile,
    state: &WorkerState,
    ui: &UiEventSender,
) -> Result<RunOutcome, ToolError> {
    let action = cmd.action;
    let mut sink = UiSink { ui };
    sink.line(heading(action));

    match run(cmd, &mut sink).await {
        Ok(outcome) => {
            info!(
                action = action.name(),
                exit_code = outcome.exit_code,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "action finished"
            );
            let ctx = HintContext {
                sshpass_available: state.tools.sshpass,
                password_given: profile.has_password(),
            };
            for line in outcome_report(action, &outcome, ctx) {
                sink.line(line);
            }
            record(state, RunRecord::finished(action, &profile.host, &outcome));
            ui.send(AppEvent::Finished {
                action,
                outcome: outcome.clone(),
            });
            Ok(outcome)
        }
        Err(err) => {
            record(state, RunRecord::failed(action, &profile.host, &err.to_string()));
            ui.send(AppEvent::Failed {
                action,
                message: err.to_string(),
            });
            Err(err)
        }
    }
}

fn record(state: &WorkerState, record: RunRecord) {
    if let Err(err) = state.history.append(&record) {
        warn!("Failed to append run history: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_events::UiEventQueue;

    #[test]
    fn sink_forwards_lines_and_progress() {
        let (queue, _notify) = UiEventQueue::new();
        let sender = queue.sender();
        let mut sink = UiSink { ui: &sender };

        sink.line(LogLine::info("hello"));
        sink.progress(40);
        sink.progress(70);

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AppEvent::Log { line } if line.text == "hello"));
        assert!(matches!(events[1], AppEvent::Progress { percent: 70 }));
    }
}
