//! The `/all` wildcard, modeled as a sum type instead of a magic string (§9).
//! The magic string `"all"` is parsed only at the HTTP boundary, via [`FromStr`].

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    All,
    Id(Uuid),
}

impl Identifier {
    pub fn is_all(&self) -> bool {
        matches!(self, Identifier::All)
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Identifier::All => None,
            Identifier::Id(id) => Some(*id),
        }
    }

    /// The literal bound for a `$n='all' OR col=$n::UUID` query parameter: the
    /// string `"all"` for the wildcard, or the UUID's string form otherwise.
    pub fn as_sql_param(&self) -> String {
        match self {
            Identifier::All => "all".to_string(),
            Identifier::Id(id) => id.to_string(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::All => write!(f, "all"),
            Identifier::Id(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid identifier segment: {0}")]
pub struct ParseIdentifierError(String);

impl FromStr for Identifier {
    type Err = ParseIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Identifier::All);
        }
        Uuid::parse_str(s)
            .map(Identifier::Id)
            .map_err(|_| ParseIdentifierError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all() {
        assert_eq!("all".parse::<Identifier>().unwrap(), Identifier::All);
    }

    #[test]
    fn parses_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(
            id.to_string().parse::<Identifier>().unwrap(),
            Identifier::Id(id)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-uuid".parse::<Identifier>().is_err());
    }

    #[test]
    fn sql_param_round_trips_through_display() {
        let id = Uuid::new_v4();
        assert_eq!(Identifier::Id(id).as_sql_param(), id.to_string());
        assert_eq!(Identifier::All.as_sql_param(), "all");
    }
}
