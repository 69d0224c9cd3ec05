// SPDX-License-Identifier: AGPL-3.0-or-later

//! Points Assigner (component C, spec.md §4.3).

use rusqlite::Connection;

use crate::discipline::{names_valid, DISCIPLINE_MAP};
use crate::schedule::get_points_schedule;

/// Ensure every categorized Race in the affected set has Points rows for its
/// top-N finishers (N = length of its schedule). Returns the number of
/// Points rows created.
pub fn recalculate_points(conn: &Connection, upgrade_discipline: &str, incremental: bool) -> anyhow::Result<i64> {
    let event_disciplines = DISCIPLINE_MAP
        .get(upgrade_discipline)
        .ok_or_else(|| anyhow::anyhow!("unknown upgrade discipline: {upgrade_discipline}"))?;

    tracing::info!(upgrade_discipline, incremental, "recalculating points");

    if !incremental {
        let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "delete from Points where result_id in (
                select Result.id from Result
                join Race on Result.race_id = Race.id
                join Event on Race.event_id = Event.id
                where Event.discipline in ({placeholders})
            )"
        );
        let params = rusqlite::params_from_iter(event_disciplines.iter());
        conn.execute(&sql, params)?;
    }

    let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "select Race.id, Race.name, Race.date, Race.starters, Race.categories, Event.discipline, Event.name
         from Race
         join Event on Race.event_id = Event.id
         where Event.discipline in ({placeholders})
           and Race.categories != '[]'
           and not exists (
               select 1 from Result join Points on Points.result_id = Result.id
               where Result.race_id = Race.id
           )"
    );
    let mut stmt = conn.prepare(&sql)?;
    struct Candidate {
        race_id: i64,
        race_name: String,
        race_date: chrono::NaiveDate,
        starters: i64,
        event_discipline: String,
        event_name: String,
    }
    let candidates: Vec<Candidate> = stmt
        .query_map(rusqlite::params_from_iter(event_disciplines.iter()), |row| {
            Ok(Candidate {
                race_id: row.get(0)?,
                race_name: row.get(1)?,
                race_date: row.get(2)?,
                starters: row.get(3)?,
                event_discipline: row.get(5)?,
                event_name: row.get(6)?,
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let mut points_created = 0i64;

    for race in candidates {
        tracing::info!(
            race_id = race.race_id,
            race = %race.race_name,
            event = %race.event_name,
            starters = race.starters,
            "evaluating race for points"
        );

        let points_vector = get_points_schedule(&race.event_discipline, &race.race_name, race.race_date, race.starters);
        if points_vector.is_empty() {
            tracing::info!(race_id = race.race_id, "invalid category or insufficient starters for this field");
            continue;
        }

        let mut result_stmt = conn.prepare(
            "select Result.id, Result.place, Person.first_name, Person.last_name
             from Result join Person on Result.person_id = Person.id
             where Result.race_id = ?",
        )?;
        struct Candidate2 {
            result_id: i64,
            place: i64,
            first_name: String,
            last_name: String,
        }
        let mut qualifying: Vec<Candidate2> = result_stmt
            .query_map([race.race_id], |row| {
                let place_str: String = row.get(1)?;
                Ok((row.get::<_, i64>(0)?, place_str, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(result_id, place_str, first_name, last_name)| {
                let place: i64 = place_str.trim().parse().ok()?;
                if place >= 1 && (place as usize) <= points_vector.len() {
                    Some(Candidate2 { result_id, place, first_name, last_name })
                } else {
                    None
                }
            })
            .collect();
        qualifying.sort_by_key(|c| c.place);

        for result in qualifying {
            if !names_valid(&result.first_name, &result.last_name) {
                tracing::debug!(first_name = %result.first_name, last_name = %result.last_name, "invalid name, skipping");
                continue;
            }
            let value = points_vector[(result.place - 1) as usize];
            tracing::info!(
                result_id = result.result_id,
                place = result.place,
                value,
                last_name = %result.last_name,
                first_name = %result.first_name,
                "awarding points"
            );
            conn.execute(
                "insert into Points (result_id, value, sum_categories, min_category) values (?, ?, '[]', 9)",
                rusqlite::params![result.result_id, value],
            )?;
            points_created += 1;
        }
    }

    tracing::info!(upgrade_discipline, points_created, "recalculation complete");
    Ok(points_created)
}
