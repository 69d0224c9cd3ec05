// SPDX-License-Identifier: AGPL-3.0-or-later

//! Category State Machine (component D, spec.md §4.4) - the heart of the
//! engine.
//!
//! The read side is materialized into a single ordered `Vec` up front
//! (one query) rather than driven off a live cursor: SQLite doesn't
//! guarantee well-defined results from writing into a table while a join
//! across that same table is still being stepped through, and this
//! component both reads and writes `Points` in the same pass (branch (a)'s
//! "erase any Points on this result" is an immediate delete). Decoupling
//! read-all from write-per-row keeps the per-person reset/accumulate logic
//! a straightforward streaming consumer over an in-memory slice, which is
//! the spirit of spec.md §9's "implement as a streaming consumer" note
//! without racing the connection against itself.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::confirm::confirm_category_change;
use crate::discipline::{place_matches_number_contract, race_name_says_women, DISCIPLINE_MAP};
use crate::scraper::Scraper;
use crate::snapshot::lookup_member_snapshot;
use crate::upgrade_rules::{can_upgrade, needs_upgrade, CatPoint};

/// First-sighting race-category shapes that get an OBRA lookup instead of
/// a flat "assign the whole set" (spec.md §4.4 branch c).
const FIRST_SIGHTING_LOOKUP_SHAPES: &[&[i32]] = &[&[1], &[1, 2], &[1, 2, 3], &[3, 4, 5]];

struct ResultCtx {
    result_id: i64,
    person_id: i64,
    place: String,
    race_id: i64,
    race_name: String,
    race_date: NaiveDate,
    #[allow(dead_code)]
    race_created: NaiveDateTime,
    categories: Vec<i32>,
    event_discipline: String,
    points_value: Option<i64>,
}

struct PersonState {
    category_set: BTreeSet<i32>,
    cat_points: Vec<CatPoint>,
    upgrade_notes: Vec<String>,
    upgrade_race_id: Option<i64>,
    upgrade_race_date: NaiveDate,
    is_woman: bool,
}

impl PersonState {
    fn fresh() -> Self {
        PersonState {
            category_set: BTreeSet::from([9]),
            cat_points: Vec::new(),
            upgrade_notes: Vec::new(),
            upgrade_race_id: None,
            upgrade_race_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            is_woman: false,
        }
    }

    fn sum(&self) -> i64 {
        self.cat_points.iter().map(|p| p.value).sum()
    }
}

/// Points expire after a year, unless the race occurred in 2021 (the
/// pandemic-year exception), in which case the window doubles.
fn expiry_window_days(race_date: NaiveDate) -> i64 {
    if race_date.year() == 2021 {
        365 * 2
    } else {
        365
    }
}

/// Python's `str.capitalize()`: first char upper, the rest lower.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
    }
}

fn format_notes(notes: &[String]) -> String {
    let distinct: BTreeSet<&str> = notes.iter().map(String::as_str).filter(|n| !n.is_empty()).collect();
    let mut ordered: Vec<&str> = distinct.into_iter().collect();
    ordered.reverse();
    ordered.iter().map(|n| capitalize(n)).collect::<Vec<_>>().join("; ")
}

fn fetch_ordered_results(conn: &Connection, upgrade_discipline: &str) -> anyhow::Result<Vec<ResultCtx>> {
    let event_disciplines = DISCIPLINE_MAP
        .get(upgrade_discipline)
        .ok_or_else(|| anyhow::anyhow!("unknown upgrade discipline: {upgrade_discipline}"))?;
    let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "select Result.id, Result.place, Person.id, Race.id, Race.name, Race.date, Race.created,
                Race.categories, Event.discipline, Points.value
         from Result
         join Person on Result.person_id = Person.id
         join Race on Result.race_id = Race.id
         join Event on Race.event_id = Event.id
         left join Points on Points.result_id = Result.id
         where Event.discipline in ({placeholders})
         order by Person.id asc, Race.date asc, Race.created asc"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(event_disciplines.iter()), |row| {
            let categories_json: String = row.get(7)?;
            let categories: Vec<i32> = serde_json::from_str(&categories_json).unwrap_or_default();
            Ok(ResultCtx {
                result_id: row.get(0)?,
                place: row.get(1)?,
                person_id: row.get(2)?,
                race_id: row.get(3)?,
                race_name: row.get(4)?,
                race_date: row.get(5)?,
                race_created: row.get(6)?,
                categories,
                event_discipline: row.get(8)?,
                points_value: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Calculate running points totals and detect upgrades/downgrades
/// (spec.md §4.4). Walks every Result for this upgrade discipline in
/// `(Person.id, Race.date, Race.created)` order, resetting per-person state
/// at each person boundary.
pub fn sum_points(conn: &Connection, scraper: &dyn Scraper, upgrade_discipline: &str) -> anyhow::Result<()> {
    tracing::info!(upgrade_discipline, "recalculating point sums and upgrades");
    let results = fetch_ordered_results(conn, upgrade_discipline)?;

    let mut state = PersonState::fresh();
    let mut prev_person: Option<i64> = None;
    let mut prev_race: Option<i64> = None;
    let mut prev_needs_upgrade = false;

    for ctx in &results {
        if prev_person == Some(ctx.person_id) {
            if prev_race == Some(ctx.race_id) {
                tracing::warn!(
                    person_id = ctx.person_id,
                    race_id = ctx.race_id,
                    place = %ctx.place,
                    "ignoring duplicate result in same race"
                );
                continue;
            }
        } else {
            state = PersonState::fresh();
            prev_needs_upgrade = false;
        }
        prev_person = Some(ctx.person_id);
        prev_race = Some(ctx.race_id);

        // Step 2: expiration sweep.
        let max_age = expiry_window_days(ctx.race_date);
        let expired: Vec<&CatPoint> = state
            .cat_points
            .iter()
            .filter(|p| (ctx.race_date - p.date).num_days() > max_age)
            .collect();
        let expired_count = expired.len();
        if expired_count > 0 {
            state
                .cat_points
                .retain(|p| (ctx.race_date - p.date).num_days() <= max_age);
            state.upgrade_notes.push(format!(
                "{} {} EXPIRED",
                expired_count,
                if expired_count == 1 { "POINT HAS" } else { "POINTS HAVE" }
            ));
        }

        let mut has_points = ctx.points_value.is_some();
        let mut current_value = ctx.points_value.unwrap_or(0);

        // upgrade_category is computed unconditionally from the category
        // set as it stands entering this result, used both by the gated
        // transition logic and by the ungated needs_upgrade check below.
        let upgrade_category = *state.category_set.iter().max().unwrap() - 1;
        let race_categories: BTreeSet<i32> = ctx.categories.iter().copied().collect();

        if place_matches_number_contract(&ctx.place) && !ctx.categories.is_empty() {
            if race_name_says_women(&ctx.race_name) {
                state.is_woman = true;
            }

            if state.category_set == BTreeSet::from([1]) && race_categories.contains(&1) {
                // (a) Already cat 1 - nowhere to go.
                if has_points {
                    conn.execute("delete from Points where result_id = ?", [ctx.result_id])?;
                }
                has_points = false;
                current_value = 0;
            } else if race_categories.contains(&upgrade_category) && prev_needs_upgrade {
                // (b) Confirming an earned upgrade.
                let snapshot = lookup_member_snapshot(conn, scraper, ctx.person_id, ctx.race_date)?;
                let obra_category = snapshot.as_ref().and_then(|s| s.category_for_discipline(&ctx.event_discipline));
                tracing::debug!(?obra_category, upgrade_category, "OBRA category check");
                if obra_category.map_or(true, |c| c <= upgrade_category) {
                    state
                        .upgrade_notes
                        .push(format!("UPGRADED TO {} WITH {} POINTS", upgrade_category, state.sum()));
                    state.cat_points.clear();
                    state.category_set = BTreeSet::from([upgrade_category]);
                    state.upgrade_race_id = Some(ctx.race_id);
                    state.upgrade_race_date = ctx.race_date;
                }
            } else if race_categories.is_disjoint(&state.category_set)
                && *state.category_set.iter().min().unwrap() > *race_categories.iter().min().unwrap()
            {
                // (c) Jumped up into a more skilled race.
                if state.category_set == BTreeSet::from([9]) {
                    let sorted_cats: Vec<i32> = race_categories.iter().copied().collect();
                    if FIRST_SIGHTING_LOOKUP_SHAPES.iter().any(|shape| shape == &sorted_cats.as_slice()) {
                        let snapshot = lookup_member_snapshot(conn, scraper, ctx.person_id, ctx.race_date)?;
                        let obra_category = snapshot.as_ref().and_then(|s| s.category_for_discipline(&ctx.event_discipline));
                        tracing::debug!(?obra_category, ?race_categories, "OBRA category check");
                        state.category_set = match obra_category {
                            Some(oc) if race_categories.contains(&oc) => BTreeSet::from([oc]),
                            _ => BTreeSet::from([*race_categories.iter().max().unwrap()]),
                        };
                    } else {
                        state.category_set = race_categories.clone();
                    }
                    if state.category_set == BTreeSet::from([1]) {
                        if has_points {
                            conn.execute("delete from Points where result_id = ?", [ctx.result_id])?;
                        }
                        has_points = false;
                        current_value = 0;
                    }
                    state.upgrade_notes.push(String::new());
                } else {
                    let target = *race_categories.iter().max().unwrap();
                    let sum = state.sum();
                    let can = can_upgrade(upgrade_discipline, sum, target, &state.cat_points, true);
                    let mut note = String::new();
                    if !can {
                        note.push_str("PREMATURELY ");
                    }
                    note.push_str(&format!("UPGRADED TO {target} WITH {sum} POINTS"));
                    state.cat_points.clear();
                    state.upgrade_notes.push(note);
                    state.category_set = BTreeSet::from([target]);
                    state.upgrade_race_id = Some(ctx.race_id);
                    state.upgrade_race_date = ctx.race_date;
                }
            } else if race_categories.is_disjoint(&state.category_set)
                && *state.category_set.iter().max().unwrap() < *race_categories.iter().max().unwrap()
            {
                // (d) Dropped down into a less skilled race.
                if state.is_woman && !race_name_says_women(&ctx.race_name) {
                    // Women may race down-category in a men's field. No-op.
                } else {
                    let sum = state.sum();
                    if sum == 0 && (ctx.race_date - state.upgrade_race_date).num_days() > max_age {
                        state.cat_points.clear();
                        let min_cat = *race_categories.iter().min().unwrap();
                        state.upgrade_notes.push(format!("DOWNGRADED TO {min_cat}"));
                        state.category_set = BTreeSet::from([min_cat]);
                        state.upgrade_race_id = Some(ctx.race_id);
                        state.upgrade_race_date = ctx.race_date;
                    } else if has_points {
                        state.upgrade_notes.push("NO POINTS FOR RACING BELOW CATEGORY".to_string());
                        current_value = 0;
                    }
                }
            } else {
                let intersection: BTreeSet<i32> = race_categories.intersection(&state.category_set).copied().collect();
                if !intersection.is_empty() && intersection.len() < state.category_set.len() && state.category_set.len() > 1 {
                    // (e) Multi-category refinement.
                    state.category_set = intersection;
                    state.upgrade_notes.push(String::new());
                }
            }
        } else if has_points {
            tracing::warn!(place = %ctx.place, categories = ?ctx.categories, "have points for a race with unusable place/categories");
        }

        let result_points_value = if has_points { current_value } else { 0 };
        state.cat_points.push(CatPoint {
            value: result_points_value,
            place: ctx.place.clone(),
            date: ctx.race_date,
        });

        let sum_now = state.sum();
        if (state.upgrade_race_id == Some(ctx.race_id) || !state.upgrade_notes.is_empty() || sum_now != 0) && !has_points {
            has_points = true;
            current_value = 0;
        }

        if has_points {
            let needed = needs_upgrade(upgrade_discipline, sum_now, upgrade_category, &state.cat_points)
                || (prev_needs_upgrade
                    && can_upgrade(upgrade_discipline, sum_now, upgrade_category, &state.cat_points, false)
                    && state.upgrade_race_id != Some(ctx.race_id));
            if needed {
                state.upgrade_notes.push("NEEDS UPGRADE".to_string());
            }

            let sum_categories: Vec<i32> = state.category_set.iter().copied().collect();
            let min_category = *state.category_set.iter().min().unwrap();

            let mut confirmation_id: Option<i64> = None;
            if state.upgrade_race_id == Some(ctx.race_id) {
                confirmation_id = confirm_category_change(
                    conn,
                    scraper,
                    ctx.person_id,
                    ctx.race_date,
                    &ctx.event_discipline,
                    &sum_categories,
                    &mut state.upgrade_notes,
                )?;
            }

            let notes = format_notes(&state.upgrade_notes);
            state.upgrade_notes.clear();

            let sum_categories_json = serde_json::to_string(&sum_categories)?;
            conn.execute(
                "insert into Points (result_id, value, notes, needs_upgrade, upgrade_confirmation, sum_value, sum_categories, min_category)
                 values (?, ?, ?, ?, ?, ?, ?, ?)
                 on conflict(result_id) do update set
                    value = excluded.value,
                    notes = excluded.notes,
                    needs_upgrade = excluded.needs_upgrade,
                    upgrade_confirmation = excluded.upgrade_confirmation,
                    sum_value = excluded.sum_value,
                    sum_categories = excluded.sum_categories,
                    min_category = excluded.min_category",
                rusqlite::params![
                    ctx.result_id,
                    current_value,
                    notes,
                    needed,
                    confirmation_id,
                    sum_now,
                    sum_categories_json,
                    min_category
                ],
            )?;

            prev_needs_upgrade = needed;
        } else {
            prev_needs_upgrade = false;
        }

        tracing::info!(
            person_id = ctx.person_id,
            race_id = ctx.race_id,
            place = %ctx.place,
            value = result_points_value,
            sum = sum_now,
            categories = ?state.category_set,
            "processed result"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_database, Database, MemoryDatabase};
    use crate::scraper::NullScraper;

    fn seed_event(conn: &Connection, discipline: &str, year: i32) -> i64 {
        conn.execute(
            "insert into Event (name, discipline, year, date) values ('Test Event', ?, ?, ?)",
            rusqlite::params![discipline, year, format!("{year}-01-01")],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_race(conn: &Connection, event_id: i64, name: &str, date: NaiveDate, categories: &str) -> i64 {
        conn.execute(
            "insert into Race (event_id, name, date, categories, starters, created, updated)
             values (?, ?, ?, ?, 50, ?, ?)",
            rusqlite::params![event_id, name, date.to_string(), categories, date.to_string(), date.to_string()],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_person(conn: &Connection) -> i64 {
        conn.execute(
            "insert into Person (first_name, last_name, team_name) values ('A', 'B', '')",
            [],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_result_with_points(conn: &Connection, race_id: i64, person_id: i64, place: &str, value: i64) -> i64 {
        conn.execute(
            "insert into Result (race_id, person_id, place) values (?, ?, ?)",
            rusqlite::params![race_id, person_id, place],
        )
        .unwrap();
        let result_id = conn.last_insert_rowid();
        conn.execute(
            "insert into Points (result_id, value, sum_categories, min_category) values (?, ?, '[]', 9)",
            rusqlite::params![result_id, value],
        )
        .unwrap();
        result_id
    }

    fn points_row(conn: &Connection, result_id: i64) -> (i64, String, bool, i64, String) {
        conn.query_row(
            "select value, notes, needs_upgrade, sum_value, sum_categories from Points where result_id = ?",
            [result_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .unwrap()
    }

    #[test]
    fn accumulates_points_and_flags_needs_upgrade() {
        let db = MemoryDatabase::new("engine_accumulate");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let event_id = seed_event(&conn, "cyclocross", 2019);
        let person_id = seed_person(&conn);

        let mut d = NaiveDate::from_ymd_opt(2019, 10, 1).unwrap();
        let mut result_ids = Vec::new();
        for _ in 0..3 {
            let race_id = seed_race(&conn, event_id, "Cat 4 Cross", d, "[4]");
            result_ids.push(seed_result_with_points(&conn, race_id, person_id, "1", 7));
            d += chrono::Duration::days(7);
        }

        sum_points(&conn, &NullScraper, "cyclocross").unwrap();

        let (_, _, needs_upgrade_last, sum_value, sum_categories) = points_row(&conn, result_ids[2]);
        assert_eq!(sum_value, 21);
        assert!(needs_upgrade_last);
        assert_eq!(sum_categories, "[4]");
    }

    #[test]
    fn first_sighting_in_mixed_field_without_snapshot_picks_max_category() {
        let db = MemoryDatabase::new("engine_first_sighting");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let event_id = seed_event(&conn, "road", 2019);
        let person_id = seed_person(&conn);
        let race_id = seed_race(&conn, event_id, "Open Road Race", NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(), "[1,2,3]");
        let result_id = seed_result_with_points(&conn, race_id, person_id, "5", 0);

        sum_points(&conn, &NullScraper, "road").unwrap();

        let (_, _, _, _, sum_categories) = points_row(&conn, result_id);
        assert_eq!(sum_categories, "[3]");
    }

    #[test]
    fn downgrades_after_a_long_absence_with_no_points() {
        let db = MemoryDatabase::new("engine_downgrade");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let event_id = seed_event(&conn, "road", 2018);
        let person_id = seed_person(&conn);

        let race_one = seed_race(&conn, event_id, "Open Road Race", NaiveDate::from_ymd_opt(2018, 6, 1).unwrap(), "[1,2,3]");
        seed_result_with_points(&conn, race_one, person_id, "5", 0);

        let race_two = seed_race(&conn, event_id, "Club Road Race", NaiveDate::from_ymd_opt(2019, 8, 1).unwrap(), "[4,5]");
        let result_two = seed_result_with_points(&conn, race_two, person_id, "1", 20);

        sum_points(&conn, &NullScraper, "road").unwrap();

        let (_, notes, _, _, sum_categories) = points_row(&conn, result_two);
        assert!(notes.to_uppercase().contains("DOWNGRADED"));
        assert_eq!(sum_categories, "[4]");
    }

    #[test]
    fn women_may_race_a_lower_category_in_an_open_field_without_penalty() {
        let db = MemoryDatabase::new("engine_women_race_down");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let event_id = seed_event(&conn, "cyclocross", 2019);
        let person_id = seed_person(&conn);

        let race_one = seed_race(&conn, event_id, "Women's Cat 1/2/3 Cross", NaiveDate::from_ymd_opt(2019, 9, 1).unwrap(), "[1,2,3]");
        seed_result_with_points(&conn, race_one, person_id, "5", 0);

        let race_two = seed_race(&conn, event_id, "Open Cat 4 Cross", NaiveDate::from_ymd_opt(2019, 9, 8).unwrap(), "[4]");
        let result_two = seed_result_with_points(&conn, race_two, person_id, "1", 7);

        sum_points(&conn, &NullScraper, "cyclocross").unwrap();

        let (value, notes, _, _, _) = points_row(&conn, result_two);
        assert_eq!(value, 7);
        assert!(!notes.to_uppercase().contains("NO POINTS"));
    }

    #[test]
    fn duplicate_result_in_same_race_is_ignored() {
        let db = MemoryDatabase::new("engine_duplicate");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let event_id = seed_event(&conn, "cyclocross", 2019);
        let person_id = seed_person(&conn);
        let race_id = seed_race(&conn, event_id, "Cat 4 Cross", NaiveDate::from_ymd_opt(2019, 10, 1).unwrap(), "[4]");
        seed_result_with_points(&conn, race_id, person_id, "1", 7);
        seed_result_with_points(&conn, race_id, person_id, "2", 6);

        sum_points(&conn, &NullScraper, "cyclocross").unwrap();
    }
}
