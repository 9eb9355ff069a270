//! XRay access-log scanning.
//!
//! A line counts only when it carries both `uuid=<hex/dash token>` and
//! `ip=<dotted token>`; everything else on the line is ignored, as are
//! lines without both markers.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Client id → distinct source addresses seen in one scan.
pub type UsageSnapshot = HashMap<String, BTreeSet<String>>;

static UUID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"uuid=([0-9a-fA-F-]+)").expect("valid uuid pattern"));
static IP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"ip=([0-9.]+)").expect("valid ip pattern"));

/// Extract `(id, address)` from one log line.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let id = UUID_RE.captures(line)?.get(1)?.as_str();
    let ip = IP_RE.captures(line)?.get(1)?.as_str();
    Some((id, ip))
}

/// Build a fresh snapshot from the log. A missing file yields an empty map.
pub fn parse_usage(log_path: &Path) -> io::Result<UsageSnapshot> {
    let file = match File::open(log_path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(UsageSnapshot::new()),
        Err(e) => return Err(e),
    };

    let mut usage = UsageSnapshot::new();
    for raw in BufReader::new(file).split(b'\n') {
        let raw = raw?;
        let line = String::from_utf8_lossy(&raw);
        if let Some((id, ip)) = parse_line(&line) {
            usage.entry(id.to_string()).or_default().insert(ip.to_string());
        }
    }
    Ok(usage)
}

/// Entries with strictly more than `limit` addresses.
pub fn detect_overuse(usage: &UsageSnapshot, limit: usize) -> UsageSnapshot {
    usage
        .iter()
        .filter(|(_, ips)| ips.len() > limit)
        .map(|(id, ips)| (id.clone(), ips.clone()))
        .collect()
}
