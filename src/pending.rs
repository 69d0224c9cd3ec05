// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pending-Upgrade Confirmer (component E, spec.md §4.8).
//!
//! For each rider's most recent race in a discipline, check whether the
//! external federation site has already recognized an upgrade the engine
//! flagged but hasn't yet seen confirmed by a subsequent result.

use rusqlite::Connection;

use crate::confirm::confirm_category_change;
use crate::discipline::DISCIPLINE_MAP;
use crate::scraper::Scraper;

struct Candidate {
    result_id: i64,
    person_id: i64,
    race_date: chrono::NaiveDate,
    event_discipline: String,
    sum_categories: Vec<i32>,
}

/// Re-check every rider's latest (non-Junior) race against the federation
/// site and confirm any outstanding upgrade. Returns the number of results
/// newly confirmed.
pub fn confirm_pending_upgrades(conn: &Connection, scraper: &dyn Scraper, upgrade_discipline: &str) -> anyhow::Result<i64> {
    let event_disciplines = DISCIPLINE_MAP
        .get(upgrade_discipline)
        .ok_or_else(|| anyhow::anyhow!("unknown upgrade discipline: {upgrade_discipline}"))?;
    let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");

    // Recomputed from scratch every pass: a rider confirmed against an
    // older "latest" race must not keep a stale row once a newer,
    // unconfirmed race takes over that slot.
    conn.execute("delete from PendingUpgrade where discipline = ?", [upgrade_discipline])?;

    // FIRST_VALUE picks each Person's single most recent, categorized,
    // needs-upgrade race in this discipline (by date, then by creation
    // order as a tiebreak), matching spec.md §4.8's "most recent race"
    // selection without a GROUP BY / aggregate dance.
    let sql = format!(
        "select distinct
            first_value(Result.id) over w as result_id,
            first_value(Person.id) over w as person_id,
            first_value(Race.date) over w as race_date,
            first_value(Event.discipline) over w as event_discipline,
            first_value(Points.sum_categories) over w as sum_categories
         from Result
         join Person on Result.person_id = Person.id
         join Race on Result.race_id = Race.id
         join Event on Race.event_id = Event.id
         join Points on Points.result_id = Result.id
         where Event.discipline in ({placeholders})
           and Race.name not like '%Junior%'
           and Race.categories != '[]'
           and Points.needs_upgrade = 1
         window w as (partition by Person.id order by Race.date desc, Race.created desc)
         order by Points.min_category asc, Points.sum_value desc"
    );

    let mut stmt = conn.prepare(&sql)?;
    let candidates: Vec<Candidate> = stmt
        .query_map(rusqlite::params_from_iter(event_disciplines.iter()), |row| {
            let sum_categories_json: String = row.get(4)?;
            Ok(Candidate {
                result_id: row.get(0)?,
                person_id: row.get(1)?,
                race_date: row.get(2)?,
                event_discipline: row.get(3)?,
                sum_categories: serde_json::from_str(&sum_categories_json).unwrap_or_default(),
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let mut confirmed = 0i64;
    for candidate in candidates {
        let mut notes = vec!["UPGRADED".to_string()];
        // Check the site against the category the rider would be
        // upgrading *into*, one below their current minimum, not the
        // category they're still racing under.
        let target_category = candidate.sum_categories.iter().copied().min().unwrap_or(9) - 1;
        let confirmation = confirm_category_change(
            conn,
            scraper,
            candidate.person_id,
            candidate.race_date,
            &candidate.event_discipline,
            &[target_category],
            &mut notes,
        )?;
        if let Some(snapshot_id) = confirmation {
            tracing::info!(person_id = candidate.person_id, result_id = candidate.result_id, "confirming pending upgrade");
            conn.execute(
                "insert into PendingUpgrade (result_id, upgrade_confirmation, discipline) values (?, ?, ?)
                 on conflict(result_id) do update set upgrade_confirmation = excluded.upgrade_confirmation",
                rusqlite::params![candidate.result_id, snapshot_id, upgrade_discipline],
            )?;
            confirmed += 1;
        }
    }

    tracing::info!(upgrade_discipline, confirmed, "pending upgrade confirmation pass complete");
    Ok(confirmed)
}
