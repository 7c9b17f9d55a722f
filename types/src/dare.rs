//! Dares: what each player has committed to prove every day.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::DuelError;

/// Longest dare text accepted, in characters.
pub const MAX_DARE_LEN: usize = 280;

/// A player's dare.
///
/// Classic battles carry one dare for the whole run. Backlog battles carry a
/// queue: the front entry is today's dare, and every submission consumes it
/// and optionally appends the next one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dare {
    Single(String),
    Backlog(VecDeque<String>),
}

impl Dare {
    pub fn single(text: impl Into<String>) -> Result<Self, DuelError> {
        let text = text.into();
        validate_text(&text)?;
        Ok(Self::Single(text))
    }

    pub fn backlog<I, S>(items: I) -> Result<Self, DuelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: VecDeque<String> = items.into_iter().map(Into::into).collect();
        if items.is_empty() {
            return Err(DuelError::InvalidDare("backlog must not be empty".into()));
        }
        for item in &items {
            validate_text(item)?;
        }
        Ok(Self::Backlog(items))
    }

    /// The dare that the next submission answers.
    pub fn current(&self) -> Option<&str> {
        match self {
            Self::Single(text) => Some(text),
            Self::Backlog(items) => items.front().map(String::as_str),
        }
    }

    pub fn is_backlog(&self) -> bool {
        matches!(self, Self::Backlog(_))
    }

    /// Pop the consumed dare and push `next` in one step.
    ///
    /// Returns the consumed dare. A single dare is never consumed.
    pub fn advance(&mut self, next: Option<String>) -> Result<Option<String>, DuelError> {
        match self {
            Self::Single(_) => Ok(None),
            Self::Backlog(items) => {
                if let Some(next) = &next {
                    validate_text(next)?;
                }
                let consumed = items.pop_front();
                if let Some(next) = next {
                    items.push_back(next);
                }
                Ok(consumed)
            }
        }
    }
}

fn validate_text(text: &str) -> Result<(), DuelError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DuelError::InvalidDare("dare text is empty".into()));
    }
    if trimmed.chars().count() > MAX_DARE_LEN {
        return Err(DuelError::InvalidDare(format!(
            "dare text exceeds {MAX_DARE_LEN} characters"
        )));
    }
    Ok(())
}
