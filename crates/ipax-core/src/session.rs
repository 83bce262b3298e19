use std::time::Duration;

use crate::command::Action;
use crate::extraction::{detect_ipa_name, filter_bundles, parse_bundle_listing};
use crate::profile::BUNDLE_ROOT;
use crate::runner::RunOutcome;
use crate::tools::ToolAvailability;

/// Probes answering faster than this are shown as a fast link.
pub const FAST_PROBE_THRESHOLD: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    ConnectedFast,
    ConnectedSlow,
}

impl LinkState {
    pub fn from_probe(outcome: &RunOutcome) -> Self {
        if !outcome.success() || !outcome.stdout.contains("Connected") {
            LinkState::Disconnected
        } else if outcome.elapsed < FAST_PROBE_THRESHOLD {
            LinkState::ConnectedFast
        } else {
            LinkState::ConnectedSlow
        }
    }

    pub fn is_connected(self) -> bool {
        self != LinkState::Disconnected
    }

    /// Indicator colour as RGB in `0.0..=1.0`.
    pub fn rgb(self) -> (f64, f64, f64) {
        let hex: u32 = match self {
            LinkState::ConnectedFast => 0xc0ffee,
            LinkState::ConnectedSlow => 0xfab52a,
            LinkState::Disconnected => 0xd6184f,
        };
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f64 / 255.0;
        (channel(16), channel(8), channel(0))
    }

    /// `None` means a solid dot.
    pub fn blink_interval(self) -> Option<Duration> {
        match self {
            LinkState::ConnectedFast => Some(Duration::from_millis(250)),
            LinkState::ConnectedSlow => Some(Duration::from_millis(500)),
            LinkState::Disconnected => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LinkState::ConnectedFast => "connected",
            LinkState::ConnectedSlow => "connected (slow)",
            LinkState::Disconnected => "disconnected",
        }
    }
}

/// Which form controls accept input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Controls {
    pub connect: bool,
    pub disconnect: bool,
    pub fields_editable: bool,
    pub refresh: bool,
    pub start: bool,
    pub download: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Session {
    pub link: LinkState,
    pub busy: Option<Action>,
    pub bundles: Vec<String>,
    pub last_ipa: Option<String>,
    pub tools: ToolAvailability,
}

impl Session {
    pub fn connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn begin_probe(&mut self) {
        self.link = LinkState::Disconnected;
        self.begin(Action::Probe);
    }

    /// Anything but a download invalidates the previously detected IPA.
    pub fn begin(&mut self, action: Action) {
        self.busy = Some(action);
        if action != Action::Download {
            self.last_ipa = None;
        }
    }

    pub fn disconnect(&mut self) {
        self.link = LinkState::Disconnected;
        self.busy = None;
        self.last_ipa = None;
    }

    /// Spawn failures leave the form idle and disconnected.
    pub fn fail(&mut self) {
        self.disconnect();
    }

    pub fn finish_probe(&mut self, outcome: &RunOutcome) -> LinkState {
        self.busy = None;
        self.last_ipa = None;
        self.link = LinkState::from_probe(outcome);
        self.link
    }

    /// Replaces the bundle list only when the listing succeeded.
    pub fn finish_bundles(&mut self, outcome: &RunOutcome) {
        self.busy = None;
        if outcome.success() {
            self.bundles = parse_bundle_listing(&outcome.stdout, BUNDLE_ROOT);
        }
    }

    /// Returns whether the follow-up execute step starts.
    pub fn finish_transfer(&mut self, outcome: &RunOutcome) -> bool {
        if outcome.success() {
            self.busy = Some(Action::Execute);
            true
        } else {
            self.busy = None;
            false
        }
    }

    pub fn finish_execute(&mut self, outcome: &RunOutcome) -> Option<&str> {
        self.busy = None;
        self.last_ipa = if outcome.success() {
            detect_ipa_name(&outcome.stdout)
        } else {
            None
        };
        self.last_ipa.as_deref()
    }

    /// The archive stays downloadable afterwards so it can be saved again.
    pub fn finish_download(&mut self, _outcome: &RunOutcome) {
        self.busy = None;
    }

    pub fn finish(&mut self, action: Action, outcome: &RunOutcome) {
        match action {
            Action::Probe => {
                self.finish_probe(outcome);
            }
            Action::ListBundles => self.finish_bundles(outcome),
            Action::Transfer => {
                self.finish_transfer(outcome);
            }
            Action::Execute => {
                self.finish_execute(outcome);
            }
            Action::Download => self.finish_download(outcome),
        }
    }

    pub fn filtered_bundles(&self, filter: &str) -> Vec<&String> {
        filter_bundles(&self.bundles, filter)
    }

    pub fn controls(&self) -> Controls {
        let idle = self.busy.is_none();
        let connected = self.connected();
        Controls {
            connect: idle && !connected,
            disconnect: idle && connected,
            fields_editable: idle && !connected,
            refresh: idle && connected,
            start: idle && connected,
            download: idle && connected && self.last_ipa.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: i32, stdout: &str, millis: u64) -> RunOutcome {
        RunOutcome {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code,
            elapsed: Duration::from_millis(millis),
        }
    }

    #[test]
    fn probe_classifies_link_speed() {
        assert_eq!(
            LinkState::from_probe(&outcome(0, "Connected\n", 300)),
            LinkState::ConnectedFast
        );
        assert_eq!(
            LinkState::from_probe(&outcome(0, "Connected\n", 1500)),
            LinkState::ConnectedSlow
        );
        assert_eq!(
            LinkState::from_probe(&outcome(0, "", 100)),
            LinkState::Disconnected
        );
        assert_eq!(
            LinkState::from_probe(&outcome(255, "Connected\n", 100)),
            LinkState::Disconnected
        );
    }

    #[test]
    fn indicator_colours_and_blink_rates() {
        let (r, g, b) = LinkState::Disconnected.rgb();
        assert!((r - 0xd6 as f64 / 255.0).abs() < 1e-9);
        assert!((g - 0x18 as f64 / 255.0).abs() < 1e-9);
        assert!((b - 0x4f as f64 / 255.0).abs() < 1e-9);
        assert_eq!(LinkState::Disconnected.blink_interval(), None);
        assert_eq!(
            LinkState::ConnectedFast.blink_interval(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            LinkState::ConnectedSlow.blink_interval(),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn controls_follow_connection_and_busy_state() {
        let mut session = Session::default();
        let idle = session.controls();
        assert!(idle.connect && idle.fields_editable);
        assert!(!idle.disconnect && !idle.refresh && !idle.start && !idle.download);

        session.begin_probe();
        let probing = session.controls();
        assert!(!probing.connect && !probing.disconnect && !probing.fields_editable);

        session.finish_probe(&outcome(0, "Connected\n", 10));
        let connected = session.controls();
        assert!(!connected.connect && connected.disconnect);
        assert!(connected.refresh && connected.start);
        assert!(!connected.fields_editable && !connected.download);

        session.begin(Action::Execute);
        assert!(!session.controls().start);
        session.finish_execute(&outcome(0, "IPA: App.ipa\n", 10));
        assert!(session.controls().download);

        session.disconnect();
        let after = session.controls();
        assert!(after.connect && !after.download);
        assert!(session.last_ipa.is_none());
    }

    #[test]
    fn execute_without_ipa_line_is_not_downloadable() {
        let mut session = Session::default();
        session.finish_probe(&outcome(0, "Connected", 10));
        session.begin(Action::Execute);
        assert_eq!(session.finish_execute(&outcome(0, "done\n", 10)), None);
        assert!(!session.controls().download);

        session.begin(Action::Execute);
        assert_eq!(
            session.finish_execute(&outcome(1, "IPA: App.ipa\n", 10)),
            None
        );
    }

    #[test]
    fn starting_an_action_forgets_the_previous_ipa() {
        let mut session = Session::default();
        session.finish_probe(&outcome(0, "Connected", 10));
        session.finish_execute(&outcome(0, "IPA: App.ipa\n", 10));
        assert_eq!(session.last_ipa.as_deref(), Some("App.ipa"));

        session.begin(Action::Download);
        session.finish_download(&outcome(0, "", 10));
        assert_eq!(session.last_ipa.as_deref(), Some("App.ipa"));
        assert!(session.controls().download);

        session.begin(Action::ListBundles);
        assert!(session.last_ipa.is_none());
    }

    #[test]
    fn transfer_success_chains_into_execute() {
        let mut session = Session::default();
        session.finish_probe(&outcome(0, "Connected", 10));
        session.begin(Action::Transfer);
        assert!(session.finish_transfer(&outcome(0, "", 10)));
        assert_eq!(session.busy, Some(Action::Execute));

        session.begin(Action::Transfer);
        assert!(!session.finish_transfer(&outcome(1, "", 10)));
        assert_eq!(session.busy, None);
    }

    #[test]
    fn failed_listing_keeps_previous_bundles() {
        let mut session = Session::default();
        session.finish_bundles(&outcome(0, "A\nB\n", 10));
        assert_eq!(session.bundles.len(), 2);
        session.finish_bundles(&outcome(2, "", 10));
        assert_eq!(session.bundles.len(), 2);
        assert_eq!(session.filtered_bundles("/b/").len(), 1);
    }

    #[test]
    fn spawn_failure_disconnects() {
        let mut session = Session::default();
        session.finish_probe(&outcome(0, "Connected", 10));
        session.begin(Action::ListBundles);
        session.fail();
        assert_eq!(session.link, LinkState::Disconnected);
        assert!(session.busy.is_none());
        assert!(session.controls().connect);
    }

    #[test]
    fn reconnecting_drops_the_previous_link() {
        let mut session = Session::default();
        session.finish_probe(&outcome(0, "Connected", 1500));
        assert_eq!(session.link, LinkState::ConnectedSlow);

        session.begin_probe();

        assert_eq!(session.link, LinkState::Disconnected);
        assert_eq!(session.busy, Some(Action::Probe));
        assert!(!session.connected());
    }
}
