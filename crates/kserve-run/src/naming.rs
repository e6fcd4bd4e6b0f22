//! Workload name derivation
//!
//! Every object a run owns (Job or CronJob, contract ConfigMap) is named
//! `<prefix>-<run name>-<uid suffix>`, squeezed into a DNS label.

/// Prefix for every workload name
pub const JOB_NAME_PREFIX: &str = "inf";

/// DNS label ceiling for Job names
pub const MAX_NAME_LEN: usize = 63;

/// CronJob name ceiling; the child Job name appends an 11-character suffix
pub const MAX_CRON_NAME_LEN: usize = 52;

const UID_SUFFIX_LEN: usize = 8;

/// Derive a DNS-label-safe name no longer than [`MAX_NAME_LEN`].
pub fn derive_name(prefix: &str, name: &str, uid: &str) -> String {
    derive_name_with_limit(prefix, name, uid, MAX_NAME_LEN)
}

/// Derive a DNS-label-safe name no longer than `limit`.
///
/// Total for any input: the result is lowercase alphanumerics and single
/// hyphens, never starts or ends with a hyphen, and always ends in the
/// 8-character uid suffix.
pub fn derive_name_with_limit(prefix: &str, name: &str, uid: &str, limit: usize) -> String {
    let suffix = uid_suffix(uid);

    let mut main = sanitize(&format!("{}-{}", prefix, name));
    if main.is_empty() {
        return suffix;
    }

    let max_main = limit.saturating_sub(UID_SUFFIX_LEN + 1);
    if main.len() > max_main {
        // ASCII only, so byte truncation is safe
        main.truncate(max_main);
        let trimmed = main.trim_end_matches('-').len();
        main.truncate(trimmed);
        if main.is_empty() {
            return suffix;
        }
    }

    format!("{}-{}", main, suffix)
}

/// First 8 ASCII alphanumerics of `uid`, lowercased, right-padded with '0'.
fn uid_suffix(uid: &str) -> String {
    let mut suffix: String = uid
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(UID_SUFFIX_LEN)
        .collect();
    while suffix.len() < UID_SUFFIX_LEN {
        suffix.push('0');
    }
    suffix
}

/// Lowercase, collapse non-alphanumeric runs to one hyphen, trim hyphens.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_hyphen = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen && !out.is_empty() {
            out.push('-');
            last_hyphen = true;
        }
    }
    let trimmed = out.trim_end_matches('-').len();
    out.truncate(trimmed);
    out
}
