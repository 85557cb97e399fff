use thiserror::Error;

use crate::MAX_KEYWORD_LENGTH;

#[derive(Debug, Error)]
pub enum Error {
    #[error("a keyword cannot be empty")]
    EmptyKeyword,
    #[error("a keyword is limited to {MAX_KEYWORD_LENGTH} characters but received one of {length}")]
    KeywordTooLong { length: usize },
    #[error("the control character {character:?} cannot appear in a keyword")]
    InvalidCharacter { character: char },
}
