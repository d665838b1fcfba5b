use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// A stringly-typed reference used at the HTTP boundary (`sonarr-42`,
/// `radarr-7`) is parsed into this tagged union immediately; everywhere else
/// in the engine a `MediaRef` is passed around instead of the raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaRef {
    Series(i32),
    Movie(i32),
}

impl MediaRef {
    pub fn id(&self) -> i32 {
        match self {
            MediaRef::Series(id) | MediaRef::Movie(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MediaRef::Series(_) => "series",
            MediaRef::Movie(_) => "movie",
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaRef::Series(id) => write!(f, "sonarr-{id}"),
            MediaRef::Movie(id) => write!(f, "radarr-{id}"),
        }
    }
}

impl FromStr for MediaRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = s
            .split_once('-')
            .ok_or_else(|| EngineError::ValidationFailed(format!("malformed media id: {s}")))?;
        let id: i32 = rest
            .parse()
            .map_err(|_| EngineError::ValidationFailed(format!("malformed media id: {s}")))?;
        match prefix {
            "sonarr" => Ok(MediaRef::Series(id)),
            "radarr" => Ok(MediaRef::Movie(id)),
            _ => Err(EngineError::ValidationFailed(format!(
                "unsupported media id prefix: {prefix}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        assert_eq!(MediaRef::Series(42).to_string(), "sonarr-42");
        assert_eq!(MediaRef::Movie(7).to_string(), "radarr-7");
        assert_eq!("sonarr-42".parse::<MediaRef>().unwrap(), MediaRef::Series(42));
        assert_eq!("radarr-7".parse::<MediaRef>().unwrap(), MediaRef::Movie(7));
    }

    #[test]
    fn rejects_unsupported_prefix() {
        assert!("plex-1".parse::<MediaRef>().is_err());
        assert!("sonarr-abc".parse::<MediaRef>().is_err());
        assert!("sonarr".parse::<MediaRef>().is_err());
    }
}
