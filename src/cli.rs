// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

use crate::discipline::DISCIPLINE_MAP;

#[derive(Error, Debug)]
pub enum ArgumentsError {
    #[error("Unknown upgrade discipline, valid disciplines are: cyclocross, road, mountain_bike, track")]
    UnknownDiscipline,
}

/// Validate a `--discipline` flag against the known upgrade-discipline tags.
pub fn parse_discipline(flag: &str) -> Result<String, ArgumentsError> {
    if DISCIPLINE_MAP.contains_key(flag) {
        Ok(flag.to_owned())
    } else {
        Err(ArgumentsError::UnknownDiscipline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_disciplines() {
        assert_eq!(parse_discipline("cyclocross").unwrap(), "cyclocross");
        assert_eq!(parse_discipline("track").unwrap(), "track");
    }

    #[test]
    fn rejects_unknown_disciplines() {
        assert!(parse_discipline("luge").is_err());
    }
}
