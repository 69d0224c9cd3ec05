// SPDX-License-Identifier: AGPL-3.0-or-later

//! Discipline map (component §4.1) and the regex contracts from spec.md §6.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Upgrade-discipline tags group event disciplines. Order preserved - it's
/// also the order used when reporting/iterating.
pub static DISCIPLINE_MAP: Lazy<IndexMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    IndexMap::from_iter([
        ("cyclocross", vec!["cyclocross"]),
        (
            "road",
            vec![
                "road",
                "circuit",
                "criterium",
                "gran_fondo",
                "gravel",
                "time_trial",
                "tour",
            ],
        ),
        (
            "mountain_bike",
            vec!["mountain_bike", "downhill", "super_d", "short_track"],
        ),
        ("track", vec!["track"]),
    ])
});

/// Place parse contract: `[0-9]+|dnf|dq`, case-insensitive.
pub static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:[0-9]+|dnf|dq)$").unwrap());

/// Name validity contract: `^[A-Za-z.'-]+`.
pub static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z.'-]+").unwrap());

/// True if `place` matches the number-parse contract.
pub fn place_matches_number_contract(place: &str) -> bool {
    NUMBER_RE.is_match(place.trim())
}

/// True if both names match the placeholder-guard contract.
pub fn names_valid(first_name: &str, last_name: &str) -> bool {
    NAME_RE.is_match(first_name) && NAME_RE.is_match(last_name)
}

/// Women detection: race name contains "women" or "junior", case-insensitive.
pub fn is_women_or_junior_field(race_name: &str) -> bool {
    let lower = race_name.to_lowercase();
    lower.contains("women") || lower.contains("junior")
}

/// Gender inference trigger: race name contains "women", case-insensitive.
/// (narrower than `is_women_or_junior_field`, used by the state machine's
/// per-race gender detection, spec.md §4.4 step 4)
pub fn race_name_says_women(race_name: &str) -> bool {
    race_name.to_lowercase().contains("women")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discipline_map_order() {
        let keys: Vec<_> = DISCIPLINE_MAP.keys().copied().collect();
        assert_eq!(keys, vec!["cyclocross", "road", "mountain_bike", "track"]);
    }

    #[test]
    fn number_contract() {
        assert!(place_matches_number_contract("1"));
        assert!(place_matches_number_contract("DNF"));
        assert!(place_matches_number_contract("dq"));
        assert!(!place_matches_number_contract("abc"));
        assert!(!place_matches_number_contract(""));
    }

    #[test]
    fn name_contract() {
        assert!(names_valid("Jean-Luc", "O'Brien"));
        assert!(!names_valid("123", "Smith"));
    }

    #[test]
    fn women_detection() {
        assert!(is_women_or_junior_field("Women's Cat 3/4"));
        assert!(is_women_or_junior_field("Junior Road Race"));
        assert!(!is_women_or_junior_field("Men's Cat 3/4"));
        assert!(race_name_says_women("Women's Cat 3/4"));
        assert!(!race_name_says_women("Men's Cat 3/4"));
    }
}
