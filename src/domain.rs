// SPDX-License-Identifier: AGPL-3.0-or-later

//! Domain entities (component A): Series, Event, Race, Person, Result,
//! Points, PendingUpgrade, Rank, Quality, MemberSnapshot.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};

/// An upgrade roster series spanning multiple events over more than one day.
#[derive(Debug, Clone)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub dates: String,
}

/// A single race day - may be standalone or part of a series.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub discipline: String,
    pub year: i32,
    pub date: String,
    pub series_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub ignore: bool,
}

/// A single race at an event, with one or more results.
#[derive(Debug, Clone)]
pub struct Race {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub categories: Vec<i32>,
    pub starters: i64,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

impl Race {
    /// Invariant 1: categories is empty, or a strictly ascending list of small positive ints.
    pub fn categories_set(&self) -> BTreeSet<i32> {
        self.categories.iter().copied().collect()
    }
}

/// A person who participated in a race.
#[derive(Debug, Clone)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub team_name: String,
}

/// A point-in-time copy of the external federation's rider profile.
///
/// The upstream site doesn't expose historical membership data, so a
/// timestamped copy is stored every time a lookup happens. Unique on
/// (date, person).
#[derive(Debug, Clone)]
pub struct MemberSnapshot {
    pub id: i64,
    pub date: NaiveDate,
    pub person_id: i64,
    pub license: Option<i64>,
    pub mtb_category: i32,
    pub dh_category: i32,
    pub ccx_category: i32,
    pub road_category: i32,
    pub track_category: i32,
}

impl MemberSnapshot {
    /// Map an event discipline onto the matching membership category, or
    /// `None` if the rider isn't a licensed member.
    pub fn category_for_discipline(&self, discipline: &str) -> Option<i32> {
        if self.license.is_none() {
            return None;
        }
        Some(match discipline {
            "mountain_bike" | "short_track" => self.mtb_category,
            "downhill" | "super_d" => self.dh_category,
            "cyclocross" => self.ccx_category,
            "road" | "circuit" | "criterium" | "time_trial" | "gran_fondo" | "gravel" | "tour" => {
                self.road_category
            }
            "track" => self.track_category,
            _ => return None,
        })
    }
}

/// An individual race result - a Person's place in a specific Race.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub id: i64,
    pub race_id: i64,
    pub person_id: Option<i64>,
    pub place: String,
    pub time: Option<i64>,
    pub laps: Option<i64>,
}

/// Points toward a category upgrade - 1:1 with Result.
#[derive(Debug, Clone)]
pub struct Points {
    pub result_id: i64,
    pub value: i64,
    pub notes: String,
    pub needs_upgrade: bool,
    pub upgrade_confirmation: Option<i64>,
    pub sum_value: i64,
    pub sum_categories: Vec<i32>,
}

impl Points {
    pub fn min_category(&self) -> i32 {
        self.sum_categories.iter().copied().min().unwrap_or(9)
    }
}

impl Default for Points {
    fn default() -> Self {
        Points {
            result_id: 0,
            value: 0,
            notes: String::new(),
            needs_upgrade: false,
            upgrade_confirmation: None,
            sum_value: 0,
            sum_categories: Vec::new(),
        }
    }
}

/// A derived record indicating an upgrade is believed to have happened on
/// the external site but hasn't yet been confirmed by a subsequent race.
#[derive(Debug, Clone)]
pub struct PendingUpgrade {
    pub result_id: i64,
    pub upgrade_confirmation: i64,
    pub discipline: String,
}

/// Rank points associated with a Result.
#[derive(Debug, Clone)]
pub struct Rank {
    pub result_id: i64,
    pub value: f64,
}

/// Race quality figures for a Race.
#[derive(Debug, Clone)]
pub struct Quality {
    pub race_id: i64,
    pub value: f64,
    pub points_per_place: f64,
}
