// SPDX-License-Identifier: AGPL-3.0-or-later

//! Points Schedule (component B, spec.md §4.2).
//!
//! Brackets and point values are reproduced verbatim from
//! `original_source/python/obra_hacks/backend/data.py`'s `SCHEDULE_2018` /
//! `SCHEDULE_2019` tables - the distilled spec only describes the lookup
//! shape, and the numbers are load-bearing for the seed scenarios (S1).

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Schedule selection boundary: races on/after this date use the 2019 table.
pub static SCHEDULE_2019_DATE: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(2019, 8, 31).unwrap());

struct FieldSizeBracket {
    min: i64,
    max: i64,
    points: &'static [i64],
}

type FieldTable = &'static [FieldSizeBracket];

struct DisciplineSchedule {
    open: FieldTable,
    women: Option<FieldTable>,
}

static CX_2019_OPEN: &[FieldSizeBracket] = &[
    FieldSizeBracket { min: 10, max: 25, points: &[3, 2, 1] },
    FieldSizeBracket { min: 26, max: 40, points: &[5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 41, max: 75, points: &[7, 6, 5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 76, max: 999, points: &[10, 8, 7, 5, 4, 3, 2, 1] },
];
static CX_2019_WOMEN: &[FieldSizeBracket] = &[
    FieldSizeBracket { min: 6, max: 15, points: &[3, 2, 1] },
    FieldSizeBracket { min: 16, max: 25, points: &[5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 26, max: 60, points: &[7, 6, 5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 61, max: 999, points: &[10, 8, 7, 5, 4, 3, 2, 1] },
];
static CIRCUIT_OPEN: &[FieldSizeBracket] = &[
    FieldSizeBracket { min: 5, max: 10, points: &[3, 2, 1] },
    FieldSizeBracket { min: 11, max: 20, points: &[4, 3, 2, 1] },
    FieldSizeBracket { min: 21, max: 49, points: &[5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 50, max: 999, points: &[7, 5, 4, 3, 2, 1] },
];
static ROAD_2019_OPEN: &[FieldSizeBracket] = &[
    FieldSizeBracket { min: 5, max: 10, points: &[3, 2, 1] },
    FieldSizeBracket { min: 11, max: 20, points: &[7, 5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 21, max: 49, points: &[8, 6, 5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 50, max: 999, points: &[10, 8, 7, 6, 5, 4, 3, 2, 1] },
];
static TOUR_OPEN: &[FieldSizeBracket] = &[
    FieldSizeBracket { min: 10, max: 19, points: &[5, 3, 2, 1] },
    FieldSizeBracket { min: 20, max: 35, points: &[7, 5, 3, 2, 1] },
    FieldSizeBracket { min: 36, max: 49, points: &[10, 8, 6, 5, 4, 3, 2, 1] },
    FieldSizeBracket {
        min: 50,
        max: 999,
        points: &[20, 18, 16, 14, 12, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1],
    },
];

static CX_2018_OPEN: &[FieldSizeBracket] = &[
    FieldSizeBracket { min: 10, max: 15, points: &[3, 2, 1] },
    FieldSizeBracket { min: 16, max: 25, points: &[5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 26, max: 60, points: &[7, 6, 5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 61, max: 999, points: &[10, 8, 7, 5, 4, 3, 2, 1] },
];
static CX_2018_WOMEN: &[FieldSizeBracket] = &[
    FieldSizeBracket { min: 6, max: 10, points: &[3, 2, 1] },
    FieldSizeBracket { min: 11, max: 20, points: &[5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 21, max: 50, points: &[7, 6, 5, 4, 3, 2, 1] },
    FieldSizeBracket { min: 51, max: 999, points: &[10, 8, 7, 5, 4, 3, 2, 1] },
];

static SCHEDULE_2019: Lazy<HashMap<&'static str, DisciplineSchedule>> = Lazy::new(|| {
    HashMap::from_iter([
        ("cyclocross", DisciplineSchedule { open: CX_2019_OPEN, women: Some(CX_2019_WOMEN) }),
        ("circuit", DisciplineSchedule { open: CIRCUIT_OPEN, women: None }),
        ("criterium", DisciplineSchedule { open: CIRCUIT_OPEN, women: None }),
        ("road", DisciplineSchedule { open: ROAD_2019_OPEN, women: None }),
        ("tour", DisciplineSchedule { open: TOUR_OPEN, women: None }),
    ])
});

static SCHEDULE_2018: Lazy<HashMap<&'static str, DisciplineSchedule>> = Lazy::new(|| {
    HashMap::from_iter([
        ("cyclocross", DisciplineSchedule { open: CX_2018_OPEN, women: Some(CX_2018_WOMEN) }),
        ("circuit", DisciplineSchedule { open: CIRCUIT_OPEN, women: None }),
        ("criterium", DisciplineSchedule { open: CIRCUIT_OPEN, women: None }),
        ("road", DisciplineSchedule { open: ROAD_2019_OPEN, women: None }),
        ("tour", DisciplineSchedule { open: TOUR_OPEN, women: None }),
    ])
});

static WOMEN_JUNIOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)women|junior").unwrap());

/// Look up the ordered places-to-points vector for a race.
///
/// Women's races fall back to `open` if no women-specific entry exists.
/// Races whose discipline isn't in the table return an empty schedule (no
/// points). See: http://www.obra.org/upgrade_rules.html (original comment).
pub fn get_points_schedule(
    event_discipline: &str,
    race_name: &str,
    race_date: NaiveDate,
    starters: i64,
) -> Vec<i64> {
    let field_is_women = WOMEN_JUNIOR_RE.is_match(race_name);
    let schedule = if race_date >= *SCHEDULE_2019_DATE {
        &*SCHEDULE_2019
    } else {
        &*SCHEDULE_2018
    };

    let Some(discipline_schedule) = schedule.get(event_discipline) else {
        tracing::warn!(
            event_discipline,
            field = if field_is_women { "women" } else { "open" },
            starters,
            %race_date,
            "no points schedule for event discipline"
        );
        return Vec::new();
    };

    let field_table = if field_is_women {
        discipline_schedule.women.unwrap_or(discipline_schedule.open)
    } else {
        discipline_schedule.open
    };

    field_table
        .iter()
        .find(|bracket| starters >= bracket.min && starters <= bracket.max)
        .map(|bracket| bracket.points.to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclocross_2019_open_50_starters() {
        let date = NaiveDate::from_ymd_opt(2019, 10, 1).unwrap();
        let points = get_points_schedule("cyclocross", "Cat 4 Cross", date, 50);
        assert_eq!(points, vec![7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn schedule_selection_boundary() {
        let before = NaiveDate::from_ymd_opt(2019, 8, 30).unwrap();
        let on = NaiveDate::from_ymd_opt(2019, 8, 31).unwrap();
        assert_eq!(
            get_points_schedule("cyclocross", "Cat 4 Cross", before, 20),
            vec![5, 4, 3, 2, 1]
        );
        assert_eq!(
            get_points_schedule("cyclocross", "Cat 4 Cross", on, 20),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn women_falls_back_to_open() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(
            get_points_schedule("road", "Women's Cat 3/4", date, 15),
            get_points_schedule("road", "Men's Cat 3/4", date, 15)
        );
    }

    #[test]
    fn unknown_discipline_is_empty() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(get_points_schedule("downhill", "Downhill Finals", date, 20).is_empty());
    }

    #[test]
    fn out_of_range_starters_is_empty() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(get_points_schedule("cyclocross", "Cat 4 Cross", date, 2).is_empty());
    }
}
