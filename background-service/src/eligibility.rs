use autoreply_core::{BotConfig, CandidateItem};
use std::fmt;

/// Why an item was turned down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingField(&'static str),
    Blacklisted(String),
    TitleTooLong { length: usize },
    ScoreTooLow { score: i64 },
    Locked,
    Archived,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingField(field) => write!(f, "missing {}", field),
            Rejection::Blacklisted(phrase) => write!(f, "title contains '{}'", phrase),
            Rejection::TitleTooLong { length } => write!(f, "title is {} characters", length),
            Rejection::ScoreTooLow { score } => write!(f, "score {} below minimum", score),
            Rejection::Locked => f.write_str("locked"),
            Rejection::Archived => f.write_str("archived"),
        }
    }
}

/// Runs every eligibility rule and reports the first one that fails.
///
/// Absent fields reject the item rather than being assumed harmless.
pub fn check(item: &CandidateItem, config: &BotConfig) -> Result<(), Rejection> {
    let title = item
        .title
        .as_deref()
        .ok_or(Rejection::MissingField("title"))?;
    let score = item.score.ok_or(Rejection::MissingField("score"))?;
    let locked = item.locked.ok_or(Rejection::MissingField("locked"))?;
    let archived = item.archived.ok_or(Rejection::MissingField("archived"))?;

    let lowered = title.to_lowercase();
    if let Some(phrase) = config
        .blacklisted_phrases
        .iter()
        .find(|phrase| lowered.contains(&phrase.to_lowercase()))
    {
        return Err(Rejection::Blacklisted(phrase.clone()));
    }

    let length = title.chars().count();
    if length > config.max_title_length {
        return Err(Rejection::TitleTooLong { length });
    }

    if score < config.min_post_score {
        return Err(Rejection::ScoreTooLow { score });
    }

    if locked {
        return Err(Rejection::Locked);
    }
    if archived {
        return Err(Rejection::Archived);
    }

    Ok(())
}

pub fn is_eligible(item: &CandidateItem, config: &BotConfig) -> bool {
    check(item, config).is_ok()
}
