use std::path::{Path, PathBuf};

use gtk::gio::prelude::FileExt;
use gtk::prelude::*;
use gtk4 as gtk;
use ipax_core::profile::remote_path_for_local;
use ipax_core::{ConnectionProfile, Controls, LogLevel, LogLine, ScriptMode, ScriptSource};
use ipax_util::expand_user;

use crate::config::AppConfig;
use crate::indicator::StatusIndicator;

const SECTION_SPACING: i32 = 12;
const ROW_SPACING: i32 = 8;
const COL_SPACING: i32 = 8;
const PAGE_MARGIN: i32 = 12;
const FORM_WIDTH: i32 = 420;

const LOG_TAGS: &[(LogLevel, &str)] = &[
    (LogLevel::Success, "#1a7f37"),
    (LogLevel::Warning, "#b26a00"),
    (LogLevel::Error, "#c62828"),
    (LogLevel::Command, "#0b7285"),
    (LogLevel::Heading, "#5c6bc0"),
    (LogLevel::Stderr, "#c62828"),
];

#[derive(Clone)]
pub(crate) struct LogPane {
    pub(crate) buffer: gtk::TextBuffer,
    pub(crate) textview: gtk::TextView,
}

impl LogPane {
    fn new() -> Self {
        let textview = gtk::TextView::builder()
            .editable(false)
            .cursor_visible(false)
            .monospace(true)
            .wrap_mode(gtk::WrapMode::WordChar)
            .hexpand(true)
            .vexpand(true)
            .build();
        let buffer = textview.buffer();
        let table = buffer.tag_table();
        for (level, colour) in LOG_TAGS {
            let tag = gtk::TextTag::builder()
                .name(level.tag())
                .foreground(*colour)
                .build();
            if *level == LogLevel::Heading {
                tag.set_weight(700);
            }
            table.add(&tag);
        }
        Self { buffer, textview }
    }

    pub(crate) fn append(&self, line: &LogLine) {
        let mut end = self.buffer.end_iter();
        let text = format!("{}\n", line.text.trim_end_matches(['\n', '\r']));
        if self.buffer.tag_table().lookup(line.level.tag()).is_some() {
            self.buffer
                .insert_with_tags_by_name(&mut end, &text, &[line.level.tag()]);
        } else {
            self.buffer.insert(&mut end, &text);
        }

        let mut end = self.buffer.end_iter();
        self.textview.scroll_to_iter(&mut end, 0.0, false, 0.0, 0.0);
    }

    pub(crate) fn clear(&self) {
        self.buffer.set_text("");
    }
}

#[derive(Clone)]
pub(crate) struct MainForm {
    pub(crate) root: gtk::Paned,
    pub(crate) host_entry: gtk::Entry,
    pub(crate) user_entry: gtk::Entry,
    pub(crate) password_entry: gtk::PasswordEntry,
    pub(crate) port_spin: gtk::SpinButton,
    pub(crate) connect_btn: gtk::Button,
    pub(crate) disconnect_btn: gtk::Button,
    pub(crate) verbose_check: gtk::CheckButton,
    pub(crate) indicator: StatusIndicator,
    pub(crate) mode_combo: gtk::ComboBoxText,
    pub(crate) local_row: gtk::Box,
    pub(crate) local_script_entry: gtk::Entry,
    pub(crate) browse_btn: gtk::Button,
    pub(crate) remote_script_entry: gtk::Entry,
    pub(crate) filter_entry: gtk::SearchEntry,
    pub(crate) bundle_combo: gtk::ComboBoxText,
    pub(crate) refresh_btn: gtk::Button,
    pub(crate) start_btn: gtk::Button,
    pub(crate) download_btn: gtk::Button,
    pub(crate) progress: gtk::ProgressBar,
    pub(crate) clear_log_btn: gtk::Button,
    pub(crate) log: LogPane,
    connect_timeout_secs: u32,
}

fn set_tooltip<W: gtk::prelude::IsA<gtk::Widget>>(widget: &W, text: &str) {
    widget.set_tooltip_text(Some(text));
}

fn section_frame<W: gtk::prelude::IsA<gtk::Widget>>(title: &str, child: &W) -> gtk::Frame {
    let frame = gtk::Frame::builder().label(title).build();
    frame.set_hexpand(true);
    child.set_margin_top(6);
    child.set_margin_bottom(6);
    child.set_margin_start(6);
    child.set_margin_end(6);
    frame.set_child(Some(child));
    frame
}

fn field_label(text: &str) -> gtk::Label {
    gtk::Label::builder().label(text).xalign(0.0).build()
}

pub(crate) fn build_form(parent: &gtk::ApplicationWindow, cfg: &AppConfig) -> MainForm {
    let sections = gtk::Box::new(gtk::Orientation::Vertical, SECTION_SPACING);
    sections.set_margin_top(PAGE_MARGIN);
    sections.set_margin_bottom(PAGE_MARGIN);
    sections.set_margin_start(PAGE_MARGIN);
    sections.set_margin_end(PAGE_MARGIN);

    // Connection
    let conn_grid = gtk::Grid::builder()
        .row_spacing(ROW_SPACING)
        .column_spacing(COL_SPACING)
        .build();
    let host_entry = gtk::Entry::builder()
        .placeholder_text("e.g. 192.168.1.10")
        .hexpand(true)
        .build();
    let user_entry = gtk::Entry::builder()
        .placeholder_text("root")
        .hexpand(true)
        .build();
    let password_entry = gtk::PasswordEntry::builder()
        .show_peek_icon(true)
        .hexpand(true)
        .build();
    let port_spin = gtk::SpinButton::with_range(1.0, 65535.0, 1.0);
    port_spin.set_digits(0);
    set_tooltip(&host_entry, "IP address or host name of the device on the local network.");
    set_tooltip(&user_entry, "SSH user on the device, usually root or mobile.");
    set_tooltip(&password_entry, "Optional. Passed to sshpass through the environment, never saved to disk.");
    set_tooltip(&port_spin, "SSH port on the device.");
    conn_grid.attach(&field_label("Device IP"), 0, 0, 1, 1);
    conn_grid.attach(&host_entry, 1, 0, 2, 1);
    conn_grid.attach(&field_label("Username"), 0, 1, 1, 1);
    conn_grid.attach(&user_entry, 1, 1, 2, 1);
    conn_grid.attach(&field_label("Password"), 0, 2, 1, 1);
    conn_grid.attach(&password_entry, 1, 2, 2, 1);
    conn_grid.attach(&field_label("Port"), 0, 3, 1, 1);
    conn_grid.attach(&port_spin, 1, 3, 1, 1);

    let connect_row = gtk::Box::new(gtk::Orientation::Horizontal, ROW_SPACING);
    let connect_btn = gtk::Button::with_label("Connect SSH");
    let disconnect_btn = gtk::Button::with_label("Disconnect");
    let indicator = StatusIndicator::new();
    let verbose_check = gtk::CheckButton::with_label("Verbose");
    set_tooltip(&connect_btn, "Runs a quick echo over SSH to check that the device answers.");
    set_tooltip(&verbose_check, "Also show every command line before it runs.");
    connect_row.append(&connect_btn);
    connect_row.append(&disconnect_btn);
    connect_row.append(&indicator.area);
    connect_row.append(&verbose_check);
    conn_grid.attach(&connect_row, 0, 4, 3, 1);
    sections.append(&section_frame("SSH connection", &conn_grid));

    // Script
    let script_grid = gtk::Grid::builder()
        .row_spacing(ROW_SPACING)
        .column_spacing(COL_SPACING)
        .build();
    let mode_combo = gtk::ComboBoxText::new();
    for mode in [ScriptMode::Local, ScriptMode::OnDevice] {
        mode_combo.append(Some(mode.id()), mode.label());
    }
    set_tooltip(&mode_combo, "SCP Script uploads a script from this computer first. Device Script runs one already on the device.");
    let local_row = gtk::Box::new(gtk::Orientation::Horizontal, COL_SPACING);
    let local_script_entry = gtk::Entry::builder()
        .placeholder_text("extract-ipa.sh on this computer")
        .hexpand(true)
        .build();
    let browse_btn = gtk::Button::with_label("Browse...");
    local_row.append(&local_script_entry);
    local_row.append(&browse_btn);
    let remote_script_entry = gtk::Entry::builder().hexpand(true).build();
    set_tooltip(&remote_script_entry, "Script location on the device. The IPA is written next to it.");
    script_grid.attach(&field_label("Mechanism"), 0, 0, 1, 1);
    script_grid.attach(&mode_combo, 1, 0, 1, 1);
    script_grid.attach(&field_label("Local script"), 0, 1, 1, 1);
    script_grid.attach(&local_row, 1, 1, 1, 1);
    script_grid.attach(&field_label("Device script"), 0, 2, 1, 1);
    script_grid.attach(&remote_script_entry, 1, 2, 1, 1);
    sections.append(&section_frame("Extraction script", &script_grid));

    // Bundles
    let bundle_box = gtk::Box::new(gtk::Orientation::Vertical, ROW_SPACING);
    let filter_entry = gtk::SearchEntry::builder()
        .placeholder_text("Filter bundles")
        .build();
    let bundle_row = gtk::Box::new(gtk::Orientation::Horizontal, COL_SPACING);
    let bundle_combo = gtk::ComboBoxText::new();
    bundle_combo.set_hexpand(true);
    let refresh_btn = gtk::Button::with_label("Refresh");
    set_tooltip(&refresh_btn, "List installed application bundles on the device.");
    bundle_row.append(&bundle_combo);
    bundle_row.append(&refresh_btn);
    bundle_box.append(&filter_entry);
    bundle_box.append(&bundle_row);
    sections.append(&section_frame("Application bundle", &bundle_box));

    // Actions
    let action_box = gtk::Box::new(gtk::Orientation::Vertical, ROW_SPACING);
    let action_row = gtk::Box::new(gtk::Orientation::Horizontal, ROW_SPACING);
    let start_btn = gtk::Button::with_label("Start");
    let download_btn = gtk::Button::with_label("Download IPA");
    start_btn.add_css_class("suggested-action");
    set_tooltip(&start_btn, "Run the extraction script against the selected bundle.");
    set_tooltip(&download_btn, "Copy the IPA produced by the last run to this computer.");
    action_row.append(&start_btn);
    action_row.append(&download_btn);
    let progress = gtk::ProgressBar::builder().show_text(true).build();
    progress.set_visible(false);
    action_box.append(&action_row);
    action_box.append(&progress);
    sections.append(&section_frame("Extraction", &action_box));

    let form_scroller = gtk::ScrolledWindow::builder()
        .hscrollbar_policy(gtk::PolicyType::Never)
        .vscrollbar_policy(gtk::PolicyType::Automatic)
        .width_request(FORM_WIDTH)
        .child(&sections)
        .build();

    // Log
    let log = LogPane::new();
    let log_scroller = gtk::ScrolledWindow::builder()
        .hexpand(true)
        .vexpand(true)
        .child(&log.textview)
        .build();
    let clear_log_btn = gtk::Button::with_label("Clear log");
    let log_header = gtk::Box::new(gtk::Orientation::Horizontal, ROW_SPACING);
    let log_title = gtk::Label::builder()
        .label("Output")
        .xalign(0.0)
        .hexpand(true)
        .css_classes(vec!["title-4"])
        .build();
    log_header.append(&log_title);
    log_header.append(&clear_log_btn);
    let log_box = gtk::Box::new(gtk::Orientation::Vertical, ROW_SPACING);
    log_box.set_margin_top(PAGE_MARGIN);
    log_box.set_margin_bottom(PAGE_MARGIN);
    log_box.set_margin_end(PAGE_MARGIN);
    log_box.append(&log_header);
    log_box.append(&log_scroller);

    let root = gtk::Paned::builder()
        .orientation(gtk::Orientation::Horizontal)
        .start_child(&form_scroller)
        .end_child(&log_box)
        .resize_start_child(false)
        .shrink_start_child(false)
        .position(FORM_WIDTH)
        .build();

    let form = MainForm {
        root,
        host_entry,
        user_entry,
        password_entry,
        port_spin,
        connect_btn,
        disconnect_btn,
        verbose_check,
        indicator,
        mode_combo,
        local_row,
        local_script_entry,
        browse_btn,
        remote_script_entry,
        filter_entry,
        bundle_combo,
        refresh_btn,
        start_btn,
        download_btn,
        progress,
        clear_log_btn,
        log,
        connect_timeout_secs: cfg.connect_timeout_secs,
    };
    form.load_config(cfg);

    let form_mode = form.clone();
    form.mode_combo.connect_changed(move |_| {
        form_mode.switch_script_mode();
    });

    let log_clear = form.log.clone();
    form.clear_log_btn.connect_clicked(move |_| log_clear.clear());

    let parent_browse = parent.clone();
    let local_entry = form.local_script_entry.clone();
    let remote_entry = form.remote_script_entry.clone();
    form.browse_btn.connect_clicked(move |_| {
        let remote_entry = remote_entry.clone();
        select_script_dialog(
            &parent_browse,
            &local_entry,
            Box::new(move |path| {
                remote_entry.set_text(&remote_path_for_local(Path::new(&path)));
            }),
        );
    });

    form
}

impl MainForm {
    fn load_config(&self, cfg: &AppConfig) {
        self.host_entry.set_text(&cfg.host);
        self.user_entry.set_text(&cfg.username);
        self.port_spin.set_value(f64::from(cfg.port));
        self.verbose_check.set_active(cfg.verbose);
        self.mode_combo.set_active_id(Some(cfg.script_mode.id()));
        self.local_script_entry.set_text(&cfg.local_script_path);
        self.remote_script_entry.set_text(&cfg.remote_script_path);
        self.update_mode_visibility();
    }

    pub(crate) fn capture_config(&self, cfg: &mut AppConfig) {
        cfg.host = self.host_entry.text().trim().to_string();
        cfg.username = self.user_entry.text().trim().to_string();
        cfg.port = self.port();
        cfg.verbose = self.verbose_check.is_active();
        cfg.script_mode = self.script_mode();
        cfg.local_script_path = self.local_script_entry.text().trim().to_string();
        cfg.remote_script_path = self.remote_script_entry.text().trim().to_string();
    }

    fn port(&self) -> u16 {
        u16::try_from(self.port_spin.value_as_int()).unwrap_or(ipax_core::profile::DEFAULT_PORT)
    }

    pub(crate) fn profile(&self) -> ConnectionProfile {
        ConnectionProfile::new(&self.host_entry.text(), &self.user_entry.text())
            .with_port(self.port())
            .with_connect_timeout(self.connect_timeout_secs)
            .with_password(&self.password_entry.text())
    }

    pub(crate) fn script_mode(&self) -> ScriptMode {
        self.mode_combo
            .active_id()
            .map(|id| ScriptMode::from_id(id.as_str()))
            .unwrap_or_default()
    }

    pub(crate) fn script_source(&self) -> ScriptSource {
        let remote_path = self.remote_script_entry.text().trim().to_string();
        match self.script_mode() {
            ScriptMode::Local => ScriptSource::Local {
                local_path: expand_user(self.local_script_entry.text().trim()),
                remote_path,
            },
            ScriptMode::OnDevice => ScriptSource::OnDevice { remote_path },
        }
    }

    pub(crate) fn selected_bundle(&self) -> Option<String> {
        self.bundle_combo
            .active_text()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    pub(crate) fn set_bundles(&self, bundles: &[&String]) {
        let previous = self.selected_bundle();
        self.bundle_combo.remove_all();
        for path in bundles {
            self.bundle_combo.append(Some(path.as_str()), path.as_str());
        }
        let kept = previous
            .as_deref()
            .map(|path| self.bundle_combo.set_active_id(Some(path)))
            .unwrap_or(false);
        if !kept && !bundles.is_empty() {
            self.bundle_combo.set_active(Some(0));
        }
    }

    fn switch_script_mode(&self) {
        let (local, remote) = self.script_mode().switch_paths(
            &self.local_script_entry.text(),
            &self.remote_script_entry.text(),
        );
        self.local_script_entry.set_text(&local);
        self.remote_script_entry.set_text(&remote);
        self.update_mode_visibility();
    }

    fn update_mode_visibility(&self) {
        self.local_row
            .set_visible(self.script_mode() == ScriptMode::Local);
    }

    pub(crate) fn apply_controls(&self, controls: &Controls) {
        let idle = controls.connect || controls.disconnect;
        self.connect_btn.set_sensitive(controls.connect);
        self.disconnect_btn.set_sensitive(controls.disconnect);
        for widget in [
            self.host_entry.upcast_ref::<gtk::Widget>(),
            self.user_entry.upcast_ref(),
            self.password_entry.upcast_ref(),
            self.port_spin.upcast_ref(),
        ] {
            widget.set_sensitive(controls.fields_editable);
        }
        for widget in [
            self.mode_combo.upcast_ref::<gtk::Widget>(),
            self.local_row.upcast_ref(),
            self.remote_script_entry.upcast_ref(),
            self.filter_entry.upcast_ref(),
            self.bundle_combo.upcast_ref(),
        ] {
            widget.set_sensitive(idle);
        }
        self.refresh_btn.set_sensitive(controls.refresh);
        self.start_btn.set_sensitive(controls.start);
        self.download_btn.set_sensitive(controls.download);
    }

    /// `None` hides the bar.
    pub(crate) fn set_progress(&self, percent: Option<u8>) {
        match percent {
            Some(percent) => {
                self.progress.set_visible(true);
                self.progress.set_fraction(f64::from(percent.min(100)) / 100.0);
                self.progress.set_text(Some(&format!("{percent}%")));
            }
            None => {
                self.progress.set_visible(false);
                self.progress.set_fraction(0.0);
            }
        }
    }

    /// Command lines show only in verbose mode.
    pub(crate) fn append_log(&self, line: &LogLine) {
        if line.level == LogLevel::Command && !self.verbose_check.is_active() {
            return;
        }
        self.log.append(line);
    }
}

fn select_script_dialog(
    parent: &gtk::ApplicationWindow,
    path_entry: &gtk::Entry,
    on_accept: Box<dyn Fn(String) + 'static>,
) {
    let dialog = gtk::FileChooserNative::new(
        Some("Select extraction script"),
        Some(parent),
        gtk::FileChooserAction::Open,
        Some("Open"),
        Some("Cancel"),
    );

    let filter = gtk::FileFilter::new();
    filter.set_name(Some("Shell scripts (.sh)"));
    filter.add_pattern("*.sh");
    dialog.add_filter(&filter);
    let all = gtk::FileFilter::new();
    all.set_name(Some("All files"));
    all.add_pattern("*");
    dialog.add_filter(&all);
    dialog.set_filter(&filter);

    let current = path_entry.text().to_string();
    if let Some(parent_dir) = Path::new(current.trim()).parent() {
        if !parent_dir.as_os_str().is_empty() {
            let _ = dialog.set_current_folder(Some(&gtk::gio::File::for_path(parent_dir)));
        }
    }

    let path_entry_dialog = path_entry.clone();
    dialog.connect_response(move |dialog, response| {
        if response == gtk::ResponseType::Accept {
            if let Some(path) = dialog.file().and_then(|file| file.path()) {
                if let Some(path_str) = path.to_str() {
                    path_entry_dialog.set_text(path_str);
                    on_accept(path_str.to_string());
                }
            }
        }
        dialog.destroy();
    });
    dialog.show();
}

/// Asks where to store the IPA. `on_done` receives `None` when cancelled.
pub(crate) fn select_ipa_save_dialog(
    parent: &gtk::ApplicationWindow,
    default_name: &str,
    start_dir: &str,
    on_done: Box<dyn Fn(Option<PathBuf>) + 'static>,
) {
    let dialog = gtk::FileChooserNative::new(
        Some("Save IPA File"),
        Some(parent),
        gtk::FileChooserAction::Save,
        Some("Save"),
        Some("Cancel"),
    );

    let filter = gtk::FileFilter::new();
    filter.set_name(Some("IPA Files (.ipa)"));
    filter.add_pattern("*.ipa");
    dialog.add_filter(&filter);
    let all = gtk::FileFilter::new();
    all.set_name(Some("All files"));
    all.add_pattern("*");
    dialog.add_filter(&all);
    dialog.set_filter(&filter);

    if !start_dir.trim().is_empty() {
        let _ = dialog.set_current_folder(Some(&gtk::gio::File::for_path(start_dir.trim())));
    }
    if !default_name.trim().is_empty() {
        dialog.set_current_name(default_name);
    }

    dialog.connect_response(move |dialog, response| {
        let chosen = if response == gtk::ResponseType::Accept {
            dialog.file().and_then(|file| file.path())
        } else {
            None
        };
        on_done(chosen);
        dialog.destroy();
    });
    dialog.show();
}
