use std::sync::OnceLock;

use regex::Regex;

use crate::profile::remote_parent;

/// Name of the archive the extraction script reports with an `IPA: <name>.ipa`
/// line. Only the first such line counts.
pub fn detect_ipa_name(stdout: &str) -> Option<String> {
    static IPA_LINE: OnceLock<Regex> = OnceLock::new();
    let re = IPA_LINE.get_or_init(|| Regex::new(r"IPA: (.+\.ipa)").expect("valid ipa regex"));
    let name = re.captures(stdout)?.get(1)?.as_str().trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Turns `ls <bundle_root>` output into full bundle directory paths.
pub fn parse_bundle_listing(stdout: &str, bundle_root: &str) -> Vec<String> {
    let root = if bundle_root.ends_with('/') {
        bundle_root.to_string()
    } else {
        format!("{bundle_root}/")
    };
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("{root}{line}/"))
        .collect()
}

/// The script writes the archive next to itself unless it reports an
/// absolute path.
pub fn remote_ipa_path(remote_script: &str, ipa_name: &str) -> String {
    if ipa_name.starts_with('/') {
        return ipa_name.to_string();
    }
    let dir = remote_parent(remote_script);
    if dir.ends_with('/') {
        format!("{dir}{ipa_name}")
    } else {
        format!("{dir}/{ipa_name}")
    }
}

/// Case-insensitive substring filter; an empty filter keeps everything.
pub fn filter_bundles<'a>(bundles: &'a [String], filter: &str) -> Vec<&'a String> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return bundles.iter().collect();
    }
    bundles
        .iter()
        .filter(|path| path.to_lowercase().contains(&needle))
        .collect()
}
