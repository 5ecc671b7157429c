use crate::config::read_input_file;
use crate::{ConfigError, CoreError};
use std::path::Path;

/// Parses a newline-delimited forum list. Blank lines are ignored and a
/// leading `r/` is dropped.
pub fn parse_forums(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .map(|line| line.strip_prefix("r/").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Reads the forum list file. An empty list is returned as-is; callers decide
/// whether that is fatal.
pub fn load_forums(path: &Path) -> Result<Vec<String>, CoreError> {
    let text = read_input_file(path)?;
    Ok(parse_forums(&text))
}

/// Like [`load_forums`], but an empty list is a configuration failure.
pub fn load_required_forums(path: &Path) -> Result<Vec<String>, CoreError> {
    let forums = load_forums(path)?;
    if forums.is_empty() {
        return Err(ConfigError::EmptyForumList {
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(forums)
}
