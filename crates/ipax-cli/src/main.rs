mod output;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use ipax_core::diagnostics::{heading, outcome_report, HintContext};
use ipax_core::extraction::{detect_ipa_name, filter_bundles, parse_bundle_listing, remote_ipa_path};
use ipax_core::history::{RunHistory, RunRecord};
use ipax_core::profile::{
    default_remote_script_path, remote_path_for_local, BUNDLE_ROOT, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_PORT, DEFAULT_USERNAME,
};
use ipax_core::tools::tool_installed;
use ipax_core::{
    run, CommandBuilder, ConnectionProfile, LinkState, LogLine, LogSink, RemoteCommand, RunOutcome,
    ScriptSource, Tool, ToolAvailability,
};
use tracing::warn;

use output::TerminalSink;

#[derive(Parser)]
#[command(
    name = "ipax",
    version,
    about = "Extract IPA archives from a jailbroken device over SSH"
)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,
    /// Also print every command line before it runs
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct ConnArgs {
    /// Device IP address or host name
    #[arg(long, env = "IPAX_HOST", global = true)]
    host: Option<String>,
    #[arg(long, env = "IPAX_USER", default_value = DEFAULT_USERNAME, global = true)]
    user: String,
    #[arg(long, env = "IPAX_PORT", default_value_t = DEFAULT_PORT, global = true)]
    port: u16,
    /// Passed to sshpass through its environment; needs sshpass installed
    #[arg(long, env = "IPAX_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, global = true)]
    connect_timeout: u32,
}

#[derive(Args)]
struct ScriptArgs {
    /// Application bundle directory on the device
    #[arg(long)]
    bundle: String,
    /// Upload this script before running it
    #[arg(long)]
    local_script: Option<PathBuf>,
    /// Script location on the device
    #[arg(long)]
    remote_script: Option<String>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Check the local ssh, scp, sshpass and rsync tools
    Doctor,
    /// Check that the device answers over SSH
    Probe,
    /// List installed application bundles
    Bundles {
        /// Case-insensitive substring filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// Run the extraction script against a bundle
    Run {
        #[command(flatten)]
        script: ScriptArgs,
    },
    /// Copy an IPA from the device
    Download {
        #[arg(long)]
        remote_ipa: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the script, then download the IPA it reports
    Extract {
        #[command(flatten)]
        script: ScriptArgs,
        /// File or directory to save into; defaults to the reported name
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show recently finished actions
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

impl ConnArgs {
    fn profile(&self) -> Result<ConnectionProfile, Box<dyn Error>> {
        let Some(host) = self.host.as_deref() else {
            return Err("missing --host (or IPAX_HOST)".into());
        };
        let mut profile = ConnectionProfile::new(host, &self.user)
            .with_port(self.port)
            .with_connect_timeout(self.connect_timeout);
        if let Some(password) = self.password.as_deref() {
            profile = profile.with_password(password);
        }
        profile.validate()?;
        Ok(profile)
    }
}

impl ScriptArgs {
    fn source(&self) -> ScriptSource {
        match &self.local_script {
            Some(local_path) => ScriptSource::Local {
                remote_path: self
                    .remote_script
                    .clone()
                    .unwrap_or_else(|| remote_path_for_local(local_path)),
                local_path: local_path.clone(),
            },
            None => ScriptSource::OnDevice {
                remote_path: self
                    .remote_script
                    .clone()
                    .unwrap_or_else(default_remote_script_path),
            },
        }
    }
}

/// One connected session: runs commands, prints their reports and records
/// them in the history journal.
struct Remote {
    profile: ConnectionProfile,
    tools: ToolAvailability,
    history: RunHistory,
    sink: TerminalSink,
}

impl Remote {
    async fn connect(conn: &ConnArgs, verbose: bool) -> Result<Self, Box<dyn Error>> {
        let profile = conn.profile()?;
        let tools = ToolAvailability::detect().await;
        let mut sink = TerminalSink::new(verbose);
        if profile.has_password() && !tools.sshpass {
            sink.line(LogLine::warning(
                "sshpass not found; ssh will ask for the password itself.",
            ));
        }
        Ok(Self {
            profile,
            tools,
            history: RunHistory::default_location(),
            sink,
        })
    }

    fn builder(&self) -> CommandBuilder<'_> {
        CommandBuilder::new(&self.profile, self.tools)
    }

    async fn step(&mut self, cmd: RemoteCommand) -> Result<RunOutcome, Box<dyn Error>> {
        let action = cmd.action;
        self.sink.line(heading(action));
        let result = run(&cmd, &mut self.sink).await;
        self.sink.finish_progress();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record(RunRecord::failed(action, &self.profile.host, &err.to_string()));
                return Err(err.into());
            }
        };
        let ctx = HintContext {
            sshpass_available: self.tools.sshpass,
            password_given: self.profile.has_password(),
        };
        for line in outcome_report(action, &outcome, ctx) {
            self.sink.line(line);
        }
        self.record(RunRecord::finished(action, &self.profile.host, &outcome));
        if !outcome.success() {
            return Err(format!("{} failed with exit code {}", action.name(), outcome.exit_code).into());
        }
        Ok(outcome)
    }

    fn record(&self, record: RunRecord) {
        if let Err(err) = self.history.append(&record) {
            warn!("Failed to append run history: {err}");
        }
    }

    async fn run_script(&mut self, script: &ScriptArgs) -> Result<Option<String>, Box<dyn Error>> {
        let source = script.source();
        source.validate()?;
        if let ScriptSource::Local {
            local_path,
            remote_path,
        } = &source
        {
            let cmd = self.builder().transfer(local_path, remote_path);
            self.step(cmd).await?;
        }
        let cmd = self.builder().execute(source.remote_path(), &script.bundle);
        let outcome = self.step(cmd).await?;
        Ok(detect_ipa_name(&outcome.stdout))
    }

    async fn download(&mut self, remote_ipa: &str, out: &Path) -> Result<(), Box<dyn Error>> {
        if !self.tools.rsync {
            self.sink.line(LogLine::warning(
                "rsync is not installed on this computer. Downloading with scp, without progress display.",
            ));
        }
        let cmd = self.builder().download(remote_ipa, out);
        self.step(cmd).await?;
        Ok(())
    }
}

/// A directory (or a path ending in `/`) receives the reported file name.
fn resolve_output(out: Option<&Path>, ipa_name: &str) -> PathBuf {
    let file_name = Path::new(ipa_name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(ipa_name));
    match out {
        None => file_name,
        Some(path) if path.is_dir() || path.to_string_lossy().ends_with('/') => {
            path.join(file_name)
        }
        Some(path) => path.to_path_buf(),
    }
}

async fn doctor(verbose: bool) -> Result<(), Box<dyn Error>> {
    let mut sink = TerminalSink::new(verbose);
    let mut missing = Vec::new();
    for tool in [Tool::Ssh, Tool::Scp] {
        if tool_installed(tool).await {
            sink.line(LogLine::success(format!("{} found.", tool.binary_name())));
        } else {
            sink.line(LogLine::error(format!(
                "{} not found. Install an OpenSSH client or set {}.",
                tool.binary_name(),
                tool.env_key()
            )));
            missing.push(tool.binary_name());
        }
    }
    for line in ToolAvailability::detect().await.report() {
        sink.line(line);
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required tools: {}", missing.join(", ")).into())
    }
}

fn print_history(limit: usize, json: bool) -> Result<(), Box<dyn Error>> {
    let history = RunHistory::default_location();
    for record in history.recent(limit)? {
        if json {
            println!("{}", serde_json::to_string(&record)?);
            continue;
        }
        let result = match (&record.exit_code, &record.error) {
            (_, Some(error)) => format!("error: {error}"),
            (Some(code), None) => format!("exit {code}"),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:>13}  {:<12} {:<20} {:>7}ms  {}",
            record.at_unix_millis,
            record.action.name(),
            record.host,
            record.elapsed_millis,
            result
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    if let Err(err) =
        ipax_util::init_tracing_with_default(if cli.verbose { "info" } else { "warn" })
    {
        eprintln!("Failed to initialise logging: {err}");
    }

    match cli.cmd {
        Cmd::Doctor => doctor(cli.verbose).await?,
        Cmd::History { limit, json } => print_history(limit, json)?,
        Cmd::Probe => {
            let mut remote = Remote::connect(&cli.conn, cli.verbose).await?;
            let cmd = remote.builder().probe();
            let outcome = remote.step(cmd).await?;
            match LinkState::from_probe(&outcome) {
                LinkState::Disconnected => {
                    return Err("device answered without the expected greeting".into())
                }
                link => println!("{}", link.label()),
            }
        }
        Cmd::Bundles { filter } => {
            let mut remote = Remote::connect(&cli.conn, cli.verbose).await?;
            remote.sink.echo_stdout = false;
            let cmd = remote.builder().list_bundles(BUNDLE_ROOT);
            let outcome = remote.step(cmd).await?;
            let bundles = parse_bundle_listing(&outcome.stdout, BUNDLE_ROOT);
            for path in filter_bundles(&bundles, filter.as_deref().unwrap_or("")) {
                println!("{path}");
            }
        }
        Cmd::Run { script } => {
            let mut remote = Remote::connect(&cli.conn, cli.verbose).await?;
            let source = script.source();
            if let Some(name) = remote.run_script(&script).await? {
                eprintln!(
                    "IPA on device: {}",
                    remote_ipa_path(source.remote_path(), &name)
                );
            }
        }
        Cmd::Download { remote_ipa, out } => {
            let mut remote = Remote::connect(&cli.conn, cli.verbose).await?;
            remote.download(&remote_ipa, &out).await?;
        }
        Cmd::Extract { script, out } => {
            let mut remote = Remote::connect(&cli.conn, cli.verbose).await?;
            let source = script.source();
            let Some(name) = remote.run_script(&script).await? else {
                return Err("the script did not report an IPA file name; nothing to download".into());
            };
            let remote_ipa = remote_ipa_path(source.remote_path(), &name);
            let local = resolve_output(out.as_deref(), &name);
            remote.download(&remote_ipa, &local).await?;
            println!("{}", local.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn script_source_follows_flags() {
        let script = ScriptArgs {
            bundle: "/var/containers/Bundle/Application/X/".into(),
            local_script: Some(PathBuf::from("/home/me/dump.sh")),
            remote_script: None,
        };
        assert_eq!(script.source().remote_path(), "/var/mobile/Documents/dump.sh");

        let on_device = ScriptArgs {
            local_script: None,
            ..script
        };
        assert_eq!(
            on_device.source(),
            ScriptSource::OnDevice {
                remote_path: "/var/mobile/Documents/extract-ipa.sh".into()
            }
        );
    }

    #[test]
    fn extract_output_defaults_to_reported_name() {
        assert_eq!(resolve_output(None, "App.ipa"), PathBuf::from("App.ipa"));
        assert_eq!(
            resolve_output(Some(Path::new("out/")), "App.ipa"),
            PathBuf::from("out/App.ipa")
        );
        assert_eq!(
            resolve_output(Some(Path::new("/tmp/renamed.ipa")), "App.ipa"),
            PathBuf::from("/tmp/renamed.ipa")
        );
    }

    #[test]
    fn host_is_required_for_remote_commands() {
        let cli = Cli::try_parse_from(["ipax", "--host", " ", "probe"]).unwrap();
        assert!(cli.conn.profile().is_err());

        let cli = Cli::try_parse_from([
            "ipax", "bundles", "--host", "10.0.0.4", "--port", "2222", "--filter", "tele",
        ])
        .unwrap();
        let profile = cli.conn.profile().unwrap();
        assert_eq!(profile.port, 2222);
        assert!(matches!(cli.cmd, Cmd::Bundles { filter: Some(ref f) } if f == "tele"));
    }
}
