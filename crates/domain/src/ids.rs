use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a character record.
///
/// Ids double as storage keys, so they are restricted to ASCII letters,
/// digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CharacterId(String);

impl CharacterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CharacterId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::validation("Character id cannot be empty"));
        }
        if let Some(invalid) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(DomainError::validation(format!(
                "Character id {s:?} contains invalid character {invalid:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for CharacterId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CharacterId> for String {
    fn from(value: CharacterId) -> Self {
        value.0
    }
}

impl AsRef<str> for CharacterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_storage_safe_ids() {
        let id: CharacterId = "mialee-02_b".parse().unwrap();
        assert_eq!(id.as_str(), "mialee-02_b");
        assert_eq!(id.to_string(), "mialee-02_b");
    }

    #[test]
    fn test_rejects_paths_and_empty_ids() {
        assert!("".parse::<CharacterId>().is_err());
        assert!("../etc/passwd".parse::<CharacterId>().is_err());
        assert!("a b".parse::<CharacterId>().is_err());
    }

    #[test]
    fn test_serde_validates() {
        let id: CharacterId = serde_json::from_str("\"tordek\"").unwrap();
        assert_eq!(id.as_str(), "tordek");
        assert!(serde_json::from_str::<CharacterId>("\"a/b\"").is_err());
    }
}
