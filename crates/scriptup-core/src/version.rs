use std::cmp::Ordering;

use semver::Version;

/// Compare an installed version against a remote one.
///
/// A missing remote version never counts as newer, so callers treat
/// `compare_version(..) >= Equal` as "nothing to update".
#[must_use]
pub fn compare_version(current: Option<&str>, remote: Option<&str>) -> Ordering {
    let Some(remote) = remote.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ordering::Greater;
    };
    let current = current.map_or("", str::trim);

    match (parse_semver(current), parse_semver(remote)) {
        (Some(current), Some(remote)) => current.cmp(&remote),
        _ => compare_segments(current, remote),
    }
}

#[must_use]
pub fn is_newer_version(latest: &str, current: &str) -> bool {
    compare_version(Some(current), Some(latest)) == Ordering::Less
}

fn parse_semver(version: &str) -> Option<Version> {
    let version = version.strip_prefix('v').unwrap_or(version);
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().map(str::parse::<u64>).transpose().ok()?;
    let patch = parts.next().map(str::parse::<u64>).transpose().ok()?;

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

/// Dot-separated comparison for versions semver rejects, such as
/// `2024.01.05.1` or `1.0b`. Missing segments count as zero.
fn compare_segments(current: &str, remote: &str) -> Ordering {
    let left: Vec<&str> = current.split('.').collect();
    let right: Vec<&str> = remote.split('.').collect();

    for index in 0..left.len().max(right.len()) {
        let a = left.get(index).copied().unwrap_or("0");
        let b = right.get(index).copied().unwrap_or("0");
        let ordering = compare_segment(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let (a_num, a_rest) = split_leading_number(a);
    let (b_num, b_rest) = split_leading_number(b);

    a_num.cmp(&b_num).then_with(|| match (a_rest.is_empty(), b_rest.is_empty()) {
        (true, true) => Ordering::Equal,
        // "1" is newer than "1b": a trailing tag marks a pre-release.
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a_rest.cmp(b_rest),
    })
}

fn split_leading_number(segment: &str) -> (u64, &str) {
    let digits = segment
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(segment.len());
    let number = segment[..digits].parse().unwrap_or(0);
    (number, &segment[digits..])
}
