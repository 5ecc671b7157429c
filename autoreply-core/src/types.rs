use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt;

/// Timestamp layout used inside the brackets of every activity log record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of title characters kept in an activity log record.
pub const TITLE_PREVIEW_CHARS: usize = 50;

/// A post listed from a forum, fetched fresh every cycle.
///
/// Every attribute except the identifier is optional so that a listing with
/// missing fields still deserializes; the eligibility filter treats an absent
/// attribute as a reason to skip the item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateItem {
    pub id: String,
    pub title: Option<String>,
    pub score: Option<i64>,
    pub locked: Option<bool>,
    pub archived: Option<bool>,
}

/// One submitted reply, as written to the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub timestamp: NaiveDateTime,
    pub forum: String,
    /// Item title, already truncated to [`TITLE_PREVIEW_CHARS`].
    pub title: String,
    pub link: String,
}

impl ActionRecord {
    pub fn new(
        timestamp: NaiveDateTime,
        forum: impl Into<String>,
        title: &str,
        link: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: truncate_to_seconds(timestamp),
            forum: forum.into(),
            title: truncate_title(title),
            link: link.into(),
        }
    }

    /// Identifier of the item this reply was posted on, taken from the link.
    pub fn item_id(&self) -> Option<&str> {
        item_id_from_link(&self.link)
    }
}

pub fn truncate_title(title: &str) -> String {
    title.chars().take(TITLE_PREVIEW_CHARS).collect()
}

fn truncate_to_seconds(timestamp: NaiveDateTime) -> NaiveDateTime {
    use chrono::Timelike;
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

/// Extracts the path segment following `/comments/` from a reply link.
pub fn item_id_from_link(link: &str) -> Option<&str> {
    let (_, rest) = link.split_once("/comments/")?;
    let id = rest.split('/').next()?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Identifiers of items already replied to. Only ever grows during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSet {
    ids: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns true when the identifier was not present before.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    /// Adds every identifier from `other`.
    pub fn merge(&mut self, other: DedupSet) {
        self.ids.extend(other.ids);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for DedupSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Recency filter applied when listing a forum's top items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookbackWindow {
    Day,
    Week,
    Month,
}

impl LookbackWindow {
    /// Windows in the order candidates are merged: shortest first.
    pub const ALL: [LookbackWindow; 3] = [
        LookbackWindow::Day,
        LookbackWindow::Week,
        LookbackWindow::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LookbackWindow::Day => "day",
            LookbackWindow::Week => "week",
            LookbackWindow::Month => "month",
        }
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
