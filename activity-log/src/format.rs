//! Text format of the activity log.
//!
//! A record is a two-line block preceded by a blank line:
//!
//! ```text
//! [2024-03-10 09:30:15] r/askscience - Why is the sky blue? Asked by a five ye...
//! https://reddit.com/r/askscience/comments/abc123/why_is_the_sky_blue/kxyz789/
//! ```
//!
//! Only newline-terminated lines are considered, so a record whose write is
//! still in flight is invisible to readers.

use autoreply_core::{item_id_from_link, ActionRecord, DedupSet, TIMESTAMP_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};

const TITLE_ELLIPSIS: &str = "...";

pub fn format_header(started_at: NaiveDateTime) -> String {
    format!(
        "Autoreply Comment History\n\
         ================================\n\
         Bot Started: {}\n\
         ================================\n",
        started_at.format(TIMESTAMP_FORMAT)
    )
}

pub fn format_record(record: &ActionRecord) -> String {
    format!(
        "\n[{}] r/{} - {}{}\n{}\n",
        record.timestamp.format(TIMESTAMP_FORMAT),
        record.forum,
        record.title,
        TITLE_ELLIPSIS,
        record.link
    )
}

struct RecordHeader {
    timestamp: NaiveDateTime,
    forum: String,
    title: String,
}

fn parse_header(line: &str) -> Option<RecordHeader> {
    if !line.starts_with('[') || line.get(20..21) != Some("]") {
        return None;
    }
    let timestamp = NaiveDateTime::parse_from_str(line.get(1..20)?, TIMESTAMP_FORMAT).ok()?;

    let rest = line.get(21..)?;
    let (_, after_prefix) = rest.split_once("r/")?;
    let (forum, title) = match after_prefix.split_once(" - ") {
        Some((forum, title)) => (forum, title),
        None => (after_prefix.split(" -").next()?, ""),
    };
    let forum = forum.trim();
    if forum.is_empty() {
        return None;
    }
    let title = title.trim();
    let title = title.strip_suffix(TITLE_ELLIPSIS).unwrap_or(title);

    Some(RecordHeader {
        timestamp,
        forum: forum.to_string(),
        title: title.to_string(),
    })
}

fn complete_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive('\n')
        .filter(|line| line.ends_with('\n'))
        .map(|line| line.trim_end_matches(['\n', '\r']))
}

fn is_link_line(line: &str) -> bool {
    line.starts_with("http")
}

/// Parses every complete record. Headers, malformed lines, and a partially
/// written trailing record are skipped.
pub fn parse_records(text: &str) -> Vec<ActionRecord> {
    let mut records = Vec::new();
    let mut pending: Option<RecordHeader> = None;

    for line in complete_lines(text) {
        let line = line.trim();
        if line.starts_with('[') {
            pending = parse_header(line);
        } else if is_link_line(line) {
            if let Some(header) = pending.take() {
                records.push(ActionRecord {
                    timestamp: header.timestamp,
                    forum: header.forum,
                    title: header.title,
                    link: line.to_string(),
                });
            }
        }
    }

    records
}

/// Rebuilds the set of replied-to item identifiers from the log text.
///
/// Every complete link line counts, even one whose header line was damaged,
/// so a mangled record can never cause a second reply to the same item.
pub fn dedup_from_text(text: &str) -> DedupSet {
    complete_lines(text)
        .map(str::trim)
        .filter(|line| is_link_line(line) && line.contains("/r/"))
        .filter_map(item_id_from_link)
        .map(String::from)
        .collect()
}

pub fn count_on_day(records: &[ActionRecord], day: NaiveDate) -> usize {
    records
        .iter()
        .filter(|record| record.timestamp.date() == day)
        .count()
}
