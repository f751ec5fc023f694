use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

/// A yes/no marker persisted as the strings "yes" and "no".
///
/// Nullable columns and the gateway's operation status use `Option<Flag>`, where `None` means
/// "unset" or "still pending" depending on the field. Keeping the third state in the `Option`
/// keeps the enum itself closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Yes,
    No,
}

impl Flag {
    pub fn is_yes(self) -> bool {
        self == Flag::Yes
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid flag value: {0}")]
pub struct InvalidFlag(String);

impl FromStr for Flag {
    type Err = InvalidFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Flag::Yes),
            "no" => Ok(Flag::No),
            other => Err(InvalidFlag(other.to_string())),
        }
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flag::Yes => write!(f, "yes"),
            Flag::No => write!(f, "no"),
        }
    }
}

/// True only when the optional flag is explicitly set to yes.
pub fn is_set(flag: Option<Flag>) -> bool {
    flag.map(Flag::is_yes).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_strings() {
        assert_eq!("yes".parse::<Flag>().unwrap(), Flag::Yes);
        assert_eq!("no".parse::<Flag>().unwrap(), Flag::No);
        assert_eq!(Flag::Yes.to_string(), "yes");
        assert!("maybe".parse::<Flag>().is_err());
    }

    #[test]
    fn unset_is_not_set() {
        assert!(is_set(Some(Flag::Yes)));
        assert!(!is_set(Some(Flag::No)));
        assert!(!is_set(None));
    }
}
