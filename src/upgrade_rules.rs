// SPDX-License-Identifier: AGPL-3.0-or-later

//! Upgrade rule tables and predicates (spec.md §4.6).
//!
//! `mountain_bike` and `track` are intentionally left empty - spec.md §9
//! flags their thresholds as an open domain question ("FIXME" in the
//! original source) and instructs implementers to parameterize and leave
//! them empty until the domain is settled. `needs_upgrade`/`can_upgrade`
//! fall through to their documented defaults for any (discipline,
//! category) pair absent from the table.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Parse a place as an integer, defaulting to a large sentinel for
/// non-numeric places (`dnf`, `dq`, ...) so they never count as podiums.
pub fn safe_place_int(place: &str) -> i64 {
    place.trim().parse().unwrap_or(999)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeThreshold {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub races: Option<i64>,
    pub podiums: Option<i64>,
}

pub static UPGRADES: Lazy<HashMap<&'static str, HashMap<i32, UpgradeThreshold>>> = Lazy::new(|| {
    HashMap::from_iter([
        (
            "cyclocross",
            HashMap::from_iter([
                (4, UpgradeThreshold { min: Some(0), max: Some(20), ..Default::default() }),
                (3, UpgradeThreshold { min: Some(0), max: Some(20), ..Default::default() }),
                (2, UpgradeThreshold { min: Some(20), max: Some(20), ..Default::default() }),
                (1, UpgradeThreshold { min: Some(20), max: Some(35), ..Default::default() }),
            ]),
        ),
        (
            "road",
            HashMap::from_iter([
                (4, UpgradeThreshold { min: Some(15), max: Some(25), races: Some(10), ..Default::default() }),
                (3, UpgradeThreshold { min: Some(20), max: Some(30), races: Some(25), ..Default::default() }),
                (2, UpgradeThreshold { min: Some(25), max: Some(40), ..Default::default() }),
                (1, UpgradeThreshold { min: Some(30), max: Some(50), ..Default::default() }),
            ]),
        ),
        ("mountain_bike", HashMap::new()),
        ("track", HashMap::new()),
    ])
});

/// A single (value, place, date) point earned toward an upgrade, still
/// within its expiry window.
#[derive(Debug, Clone)]
pub struct CatPoint {
    pub value: i64,
    pub place: String,
    pub date: chrono::NaiveDate,
}

/// Determine if the rider needs an upgrade for this discipline (spec.md §4.6).
pub fn needs_upgrade(upgrade_discipline: &str, sum: i64, category: i32, cat_points: &[CatPoint]) -> bool {
    let Some(threshold) = UPGRADES.get(upgrade_discipline).and_then(|t| t.get(&category)) else {
        return false;
    };
    if let Some(podiums) = threshold.podiums {
        let podium_races = cat_points.iter().filter(|p| safe_place_int(&p.place) <= 3).count() as i64;
        podium_races >= podiums
    } else {
        match threshold.max {
            Some(max) => sum >= max,
            None => false,
        }
    }
}

/// Determine if the rider can upgrade to a given category (spec.md §4.6).
pub fn can_upgrade(
    upgrade_discipline: &str,
    sum: i64,
    category: i32,
    cat_points: &[CatPoint],
    check_min_races: bool,
) -> bool {
    let Some(threshold) = UPGRADES.get(upgrade_discipline).and_then(|t| t.get(&category)) else {
        return true;
    };
    if threshold.podiums.is_some() {
        return category > 0;
    }
    if check_min_races {
        if let Some(races) = threshold.races {
            if cat_points.len() as i64 >= races {
                return true;
            }
        }
    }
    match threshold.min {
        Some(min) => sum >= min,
        None => true,
    }
}
