mod commands;
mod config;
mod form;
mod indicator;
mod ui_events;
mod worker;

use std::{cell::RefCell, rc::Rc, thread};

use gtk::prelude::*;
use gtk4 as gtk;
use ipax_core::extraction::remote_ipa_path;
use ipax_core::{Action, LinkState, LogLine, ScriptMode, Session};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use commands::{AppEvent, UiCommand};
use config::AppConfig;
use form::{build_form, select_ipa_save_dialog, MainForm};
use ui_events::UiEventQueue;
use worker::{handle_command, WorkerState};

const RSYNC_NOTICE: &str = "This application needs rsync installed on the device. If it is not installed yet, install it first through a package manager such as:\n\n1. Sileo\n2. Zebra\nor similar.";

fn main() {
    if let Err(err) = ipax_util::init_tracing() {
        eprintln!("Failed to initialise logging: {err}");
    }

    let app = gtk::Application::builder()
        .application_id("dev.ipax.extractor")
        .build();

    app.connect_activate(build_ui);
    app.run();
}

fn show_message(
    parent: &gtk::ApplicationWindow,
    kind: gtk::MessageType,
    title: &str,
    text: &str,
) -> gtk::MessageDialog {
    let dialog = gtk::MessageDialog::builder()
        .transient_for(parent)
        .modal(true)
        .message_type(kind)
        .text(title)
        .secondary_text(text)
        .build();
    dialog.add_button("OK", gtk::ResponseType::Close);
    dialog.connect_response(|dialog, _| dialog.close());
    dialog.show();
    dialog
}

fn send_command(cmd_tx: &mpsc::Sender<UiCommand>, form: &MainForm, cmd: UiCommand) -> bool {
    let name = cmd.name();
    match cmd_tx.try_send(cmd) {
        Ok(()) => true,
        Err(err) => {
            warn!(command = name, "failed to queue command: {err}");
            form.append_log(&LogLine::error(format!(
                "Could not start {name}: the background worker is unavailable."
            )));
            false
        }
    }
}

fn refresh_controls(form: &MainForm, session: &Session) {
    form.apply_controls(&session.controls());
}

fn build_ui(app: &gtk::Application) {
    let window = gtk::ApplicationWindow::builder()
        .application(app)
        .title("IPA Extractor (via SSH)")
        .default_width(1200)
        .default_height(640)
        .resizable(true)
        .build();

    let cfg = Rc::new(RefCell::new(AppConfig::load()));
    let session = Rc::new(RefCell::new(Session::default()));

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<UiCommand>(128);
    let (event_queue, mut notify_rx) = UiEventQueue::new();
    let ui_events = event_queue.sender();

    // Tool invocations run on a background tokio runtime; results come back
    // through the event queue.
    thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(err) => {
                error!("failed to build tokio runtime: {err}");
                return;
            }
        };

        rt.block_on(async move {
            let mut worker_state = WorkerState::default();
            while let Some(cmd) = cmd_rx.recv().await {
                let cmd_name = cmd.name();
                info!(command = cmd_name, "ui command start");
                if let Err(err) = handle_command(cmd, &mut worker_state, ui_events.clone()).await {
                    warn!(command = cmd_name, "worker error: {err}");
                }
            }
        });
    });

    let form = build_form(&window, &cfg.borrow());
    refresh_controls(&form, &session.borrow());
    send_command(&cmd_tx, &form, UiCommand::DetectTools);

    {
        let form = form.clone();
        let session = session.clone();
        let cmd_tx = cmd_tx.clone();
        let window = window.clone();
        form.connect_btn.clone().connect_clicked(move |_| {
            let profile = form.profile();
            if let Err(err) = profile.validate() {
                show_message(&window, gtk::MessageType::Warning, "Input Error", &err.to_string());
                return;
            }
            form.append_log(&LogLine::info(format!(
                "Connecting to {}:{}...",
                profile.destination(),
                profile.port
            )));
            let mut session = session.borrow_mut();
            session.begin_probe();
            form.indicator.set_state(LinkState::Disconnected);
            refresh_controls(&form, &session);
            if !send_command(&cmd_tx, &form, UiCommand::Probe { profile }) {
                session.fail();
                refresh_controls(&form, &session);
            }
        });
    }

    {
        let form = form.clone();
        let session = session.clone();
        form.disconnect_btn.clone().connect_clicked(move |_| {
            let mut session = session.borrow_mut();
            session.disconnect();
            form.indicator.set_state(LinkState::Disconnected);
            form.set_progress(None);
            form.append_log(&LogLine::info("SSH disconnected."));
            refresh_controls(&form, &session);
        });
    }

    {
        let form = form.clone();
        let session = session.clone();
        let cmd_tx = cmd_tx.clone();
        form.refresh_btn.clone().connect_clicked(move |_| {
            let mut session = session.borrow_mut();
            if !session.connected() {
                return;
            }
            session.begin(Action::ListBundles);
            refresh_controls(&form, &session);
            let cmd = UiCommand::ListBundles {
                profile: form.profile(),
            };
            if !send_command(&cmd_tx, &form, cmd) {
                session.fail();
                refresh_controls(&form, &session);
            }
        });
    }

    {
        let form_filter = form.clone();
        let session = session.clone();
        form.filter_entry.connect_search_changed(move |entry| {
            let session = session.borrow();
            form_filter.set_bundles(&session.filtered_bundles(&entry.text()));
        });
    }

    {
        let form = form.clone();
        let session = session.clone();
        let cmd_tx = cmd_tx.clone();
        let window = window.clone();
        form.start_btn.clone().connect_clicked(move |_| {
            if !session.borrow().connected() {
                show_message(
                    &window,
                    gtk::MessageType::Warning,
                    "Connection Error",
                    "Please connect to SSH first using the 'Connect SSH' button.",
                );
                return;
            }
            let Some(bundle) = form.selected_bundle() else {
                show_message(
                    &window,
                    gtk::MessageType::Warning,
                    "Input Error",
                    "Please refresh and select an application bundle first.",
                );
                return;
            };
            let source = form.script_source();
            if let Err(err) = source.validate() {
                show_message(&window, gtk::MessageType::Warning, "Input Error", &err.to_string());
                return;
            }

            let mut session = session.borrow_mut();
            session.begin(match source.mode() {
                ScriptMode::Local => Action::Transfer,
                ScriptMode::OnDevice => Action::Execute,
            });
            form.set_progress(None);
            refresh_controls(&form, &session);
            let cmd = UiCommand::RunScript {
                profile: form.profile(),
                source,
                bundle,
            };
            if !send_command(&cmd_tx, &form, cmd) {
                session.fail();
                refresh_controls(&form, &session);
            }
        });
    }

    {
        let form = form.clone();
        let session = session.clone();
        let cfg = cfg.clone();
        let cmd_tx = cmd_tx.clone();
        let window = window.clone();
        form.download_btn.clone().connect_clicked(move |_| {
            let Some(ipa_name) = session.borrow().last_ipa.clone() else {
                show_message(
                    &window,
                    gtk::MessageType::Warning,
                    "IPA Not Ready",
                    "IPA file not yet generated or its filename could not be determined from the last operation.",
                );
                return;
            };
            let remote_ipa = remote_ipa_path(form.remote_script_entry.text().trim(), &ipa_name);
            let start_dir = cfg.borrow().download_dir.clone();

            let form = form.clone();
            let session = session.clone();
            let cfg = cfg.clone();
            let cmd_tx = cmd_tx.clone();
            select_ipa_save_dialog(
                &window,
                &ipa_name,
                &start_dir,
                Box::new(move |chosen| {
                    let Some(local_path) = chosen else {
                        form.append_log(&LogLine::info("IPA download cancelled by user."));
                        return;
                    };
                    if let Some(dir) = local_path.parent().and_then(|dir| dir.to_str()) {
                        let mut cfg = cfg.borrow_mut();
                        cfg.download_dir = dir.to_string();
                        if let Err(err) = cfg.save() {
                            warn!("Failed to persist UI config: {err}");
                        }
                    }
                    form.append_log(&LogLine::info(format!(
                        "Downloading {remote_ipa} to {}",
                        local_path.display()
                    )));

                    let mut session = session.borrow_mut();
                    session.begin(Action::Download);
                    form.set_progress(session.tools.rsync.then_some(0));
                    refresh_controls(&form, &session);
                    let cmd = UiCommand::Download {
                        profile: form.profile(),
                        remote_ipa: remote_ipa.clone(),
                        local_path,
                    };
                    if !send_command(&cmd_tx, &form, cmd) {
                        session.fail();
                        form.set_progress(None);
                        refresh_controls(&form, &session);
                    }
                }),
            );
        });
    }

    if !cfg.borrow().rsync_notice_shown {
        let dialog = show_message(
            &window,
            gtk::MessageType::Info,
            "Important Information",
            RSYNC_NOTICE,
        );
        let cfg = cfg.clone();
        dialog.connect_response(move |_, _| {
            let mut cfg = cfg.borrow_mut();
            if cfg.rsync_notice_shown {
                return;
            }
            cfg.rsync_notice_shown = true;
            if let Err(err) = cfg.save() {
                warn!("Failed to persist UI config: {err}");
            }
        });
    }

    // Event routing: drain worker events on the GTK thread.
    {
        let form = form.clone();
        let session = session.clone();
        let window = window.clone();
        glib::MainContext::default().spawn_local(async move {
            while notify_rx.recv().await.is_some() {
                for ev in event_queue.drain() {
                    let mut session = session.borrow_mut();
                    match ev {
                        AppEvent::Log { line } => form.append_log(&line),
                        AppEvent::Tools { tools } => session.tools = tools,
                        AppEvent::Progress { percent } => form.set_progress(Some(percent)),
                        AppEvent::Finished { action, outcome } => {
                            match action {
                                Action::Probe => {
                                    let link = session.finish_probe(&outcome);
                                    form.indicator.set_state(link);
                                }
                                Action::ListBundles => {
                                    session.finish_bundles(&outcome);
                                    let filter = form.filter_entry.text();
                                    form.set_bundles(&session.filtered_bundles(&filter));
                                }
                                Action::Download => {
                                    session.finish_download(&outcome);
                                    form.set_progress(None);
                                }
                                Action::Transfer | Action::Execute => {
                                    session.finish(action, &outcome);
                                }
                            }
                            refresh_controls(&form, &session);
                        }
                        AppEvent::Failed { action, message } => {
                            warn!(action = action.name(), "action failed: {message}");
                            session.fail();
                            form.indicator.set_state(LinkState::Disconnected);
                            form.set_progress(None);
                            form.append_log(&LogLine::error(message.clone()));
                            refresh_controls(&form, &session);
                            show_message(&window, gtk::MessageType::Error, "Error", &message);
                        }
                    }
                }
            }
        });
    }

    {
        let cfg = cfg.clone();
        let form = form.clone();
        window.connect_close_request(move |_| {
            let mut cfg = cfg.borrow_mut();
            form.capture_config(&mut cfg);
            if let Err(err) = cfg.save() {
                warn!("Failed to persist UI config: {err}");
            }
            glib::Propagation::Proceed
        });
    }

    window.set_child(Some(&form.root));
    window.present();
}
