// SPDX-License-Identifier: AGPL-3.0-or-later

//! Race Ranker (component F, spec.md §4.9).
//!
//! The scalar quality/rank formula is left to a pluggable policy per
//! spec.md §9's Open Question; `DefaultQualityPolicy` is the shipped
//! default, a pure function of the race and its results so the ordering
//! invariant in spec.md §4.9 holds by construction.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::domain::{Quality, Race, Rank, ResultRow};
use crate::upgrade_rules::safe_place_int;

/// Derives race quality and per-result rank points. Implementations must
/// be pure: same inputs, same outputs, no hidden state.
pub trait QualityPolicy {
    fn evaluate(&self, race: &Race, results: &[ResultRow], prior_rank: &HashMap<i64, f64>) -> (Quality, Vec<Rank>);
}

/// Quality scales with field depth (starters and category count); rank
/// points scale with quality and the field's average prior strength,
/// tapered by finishing position.
pub struct DefaultQualityPolicy;

impl QualityPolicy for DefaultQualityPolicy {
    fn evaluate(&self, race: &Race, results: &[ResultRow], prior_rank: &HashMap<i64, f64>) -> (Quality, Vec<Rank>) {
        let category_depth = race.categories.len().max(1) as f64;
        let starters = race.starters.max(results.len() as i64) as f64;

        let prior_values: Vec<f64> = results
            .iter()
            .filter_map(|r| r.person_id.and_then(|id| prior_rank.get(&id)).copied())
            .collect();
        let mean_prior_rank = if prior_values.is_empty() {
            0.0
        } else {
            prior_values.iter().sum::<f64>() / prior_values.len() as f64
        };

        let quality = round2(starters.ln_1p() * category_depth.sqrt() * (1.0 + mean_prior_rank));
        let points_per_place = if starters > 0.0 { round2(quality / starters) } else { 0.0 };

        let mut ranks = Vec::with_capacity(results.len());
        for result in results {
            let place = safe_place_int(&result.place);
            let value = if place >= 1 && (place as f64) <= starters {
                round2(points_per_place * (starters - place as f64 + 1.0))
            } else {
                0.0
            };
            ranks.push(Rank { result_id: result.id, value });
        }

        (
            Quality {
                race_id: race.id,
                value: quality,
                points_per_place,
            },
            ranks,
        )
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn fetch_results(conn: &Connection, race_id: i64) -> anyhow::Result<Vec<ResultRow>> {
    let mut stmt = conn.prepare("select id, race_id, person_id, place, time, laps from Result where race_id = ?")?;
    let rows = stmt
        .query_map([race_id], |row| {
            Ok(ResultRow {
                id: row.get(0)?,
                race_id: row.get(1)?,
                person_id: row.get(2)?,
                place: row.get(3)?,
                time: row.get(4)?,
                laps: row.get(5)?,
            })
        })?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}

fn fetch_race(conn: &Connection, race_id: i64) -> anyhow::Result<Race> {
    conn.query_row(
        "select id, event_id, name, date, categories, starters, created, updated from Race where id = ?",
        [race_id],
        |row| {
            let categories_json: String = row.get(4)?;
            Ok(Race {
                id: row.get(0)?,
                event_id: row.get(1)?,
                name: row.get(2)?,
                date: row.get(3)?,
                categories: serde_json::from_str(&categories_json).unwrap_or_default(),
                starters: row.get(5)?,
                created: row.get(6)?,
                updated: row.get(7)?,
            })
        },
    )
    .map_err(anyhow::Error::from)
}

fn prior_rank_by_person(conn: &Connection, upgrade_discipline: &str) -> anyhow::Result<HashMap<i64, f64>> {
    use crate::discipline::DISCIPLINE_MAP;
    let event_disciplines = DISCIPLINE_MAP
        .get(upgrade_discipline)
        .ok_or_else(|| anyhow::anyhow!("unknown upgrade discipline: {upgrade_discipline}"))?;
    let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "select Result.person_id, avg(Rank.value)
         from Rank
         join Result on Rank.result_id = Result.id
         join Race on Result.race_id = Race.id
         join Event on Race.event_id = Event.id
         where Event.discipline in ({placeholders}) and Result.person_id is not null
         group by Result.person_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(event_disciplines.iter()), |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

/// Recompute Quality and Rank for every Race in a discipline that doesn't
/// have them yet, using `policy` for the scalar formula.
pub fn recalculate_ranks(conn: &Connection, upgrade_discipline: &str, policy: &dyn QualityPolicy) -> anyhow::Result<i64> {
    use crate::discipline::DISCIPLINE_MAP;
    let event_disciplines = DISCIPLINE_MAP
        .get(upgrade_discipline)
        .ok_or_else(|| anyhow::anyhow!("unknown upgrade discipline: {upgrade_discipline}"))?;
    let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");

    let prior_rank = prior_rank_by_person(conn, upgrade_discipline)?;

    let sql = format!(
        "select Race.id from Race
         join Event on Race.event_id = Event.id
         where Event.discipline in ({placeholders})
           and not exists (select 1 from Quality where Quality.race_id = Race.id)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let race_ids: Vec<i64> = stmt
        .query_map(rusqlite::params_from_iter(event_disciplines.iter()), |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let mut ranked = 0i64;
    for race_id in race_ids {
        let race = fetch_race(conn, race_id)?;
        let results = fetch_results(conn, race_id)?;
        if results.is_empty() {
            continue;
        }
        let (quality, ranks) = policy.evaluate(&race, &results, &prior_rank);

        conn.execute(
            "insert into Quality (race_id, value, points_per_place) values (?, ?, ?)",
            rusqlite::params![quality.race_id, quality.value, quality.points_per_place],
        )?;
        for rank in &ranks {
            conn.execute(
                "insert into Rank (result_id, value) values (?, ?)
                 on conflict(result_id) do update set value = excluded.value",
                rusqlite::params![rank.result_id, rank.value],
            )?;
        }
        ranked += 1;
        tracing::debug!(race_id, quality = quality.value, results = ranks.len(), "ranked race");
    }

    tracing::info!(upgrade_discipline, ranked, "ranking pass complete");
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_database, Database, MemoryDatabase};

    fn seed_race(conn: &Connection, discipline: &str, starters: i64, categories: &str) -> i64 {
        conn.execute(
            "insert into Event (name, discipline, year, date) values ('Test Event', ?, 2020, '2020-01-01')",
            [discipline],
        )
        .unwrap();
        let event_id = conn.last_insert_rowid();
        conn.execute(
            "insert into Race (event_id, name, date, categories, starters, created, updated)
             values (?, 'Open Race', '2020-01-01', ?, ?, '2020-01-01', '2020-01-01')",
            rusqlite::params![event_id, categories, starters],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_result(conn: &Connection, race_id: i64, place: &str) -> i64 {
        conn.execute("insert into Person (first_name, last_name) values ('A', 'B')", []).unwrap();
        let person_id = conn.last_insert_rowid();
        conn.execute(
            "insert into Result (race_id, person_id, place) values (?, ?, ?)",
            rusqlite::params![race_id, person_id, place],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn ranks_decrease_with_worse_placing() {
        let db = MemoryDatabase::new("ranking_decreasing");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let race_id = seed_race(&conn, "road", 20, "[4]");
        let first = seed_result(&conn, race_id, "1");
        let second = seed_result(&conn, race_id, "2");
        let last = seed_result(&conn, race_id, "20");

        recalculate_ranks(&conn, "road", &DefaultQualityPolicy).unwrap();

        let rank = |result_id: i64| -> f64 {
            conn.query_row("select value from Rank where result_id = ?", [result_id], |row| row.get(0)).unwrap()
        };
        assert!(rank(first) > rank(second));
        assert!(rank(second) > rank(last));
    }

    #[test]
    fn skips_races_that_already_have_quality() {
        let db = MemoryDatabase::new("ranking_idempotent");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let race_id = seed_race(&conn, "road", 20, "[4]");
        seed_result(&conn, race_id, "1");

        assert_eq!(recalculate_ranks(&conn, "road", &DefaultQualityPolicy).unwrap(), 1);
        assert_eq!(recalculate_ranks(&conn, "road", &DefaultQualityPolicy).unwrap(), 0);
    }

    #[test]
    fn deeper_category_split_yields_higher_quality() {
        let db = MemoryDatabase::new("ranking_category_depth");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        let shallow = seed_race(&conn, "road", 20, "[4]");
        seed_result(&conn, shallow, "1");
        let deep = seed_race(&conn, "road", 20, "[1,2,3,4]");
        seed_result(&conn, deep, "1");

        recalculate_ranks(&conn, "road", &DefaultQualityPolicy).unwrap();

        let quality = |race_id: i64| -> f64 {
            conn.query_row("select value from Quality where race_id = ?", [race_id], |row| row.get(0)).unwrap()
        };
        assert!(quality(deep) > quality(shallow));
    }
}
