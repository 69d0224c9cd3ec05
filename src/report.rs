// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reporter (component G, spec.md §4.10).
//!
//! Reads the derived tables and prints, per upgrade-discipline, riders
//! whose latest Points row needs an upgrade and whose MemberSnapshot
//! category hasn't already crossed the threshold, followed by each
//! rider's points history within the last calendar year.

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::discipline::DISCIPLINE_MAP;

#[derive(Debug, Serialize)]
pub struct PendingRider {
    pub person_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub category: i32,
}

pub struct HistoryEntry {
    pub race_name: String,
    pub race_date: NaiveDate,
    pub place: String,
    pub value: i64,
    pub notes: String,
}

/// Output sink for the upgrade roster, pluggable per spec.md §4.10.
pub trait ReportWriter {
    fn write_pending(&mut self, upgrade_discipline: &str, riders: &[PendingRider]) -> anyhow::Result<()>;
    fn write_history(&mut self, person: &PendingRider, history: &[HistoryEntry]) -> anyhow::Result<()>;
}

/// Find every rider needing an upgrade in this discipline, active within
/// roughly the last year, whose latest MemberSnapshot category hasn't
/// already crossed that threshold. Exposed for the read API's JSON
/// projection as well as the text/HTML reporter.
pub fn pending_riders(conn: &Connection, upgrade_discipline: &str, today: NaiveDate) -> anyhow::Result<Vec<PendingRider>> {
    let event_disciplines = DISCIPLINE_MAP
        .get(upgrade_discipline)
        .ok_or_else(|| anyhow::anyhow!("unknown upgrade discipline: {upgrade_discipline}"))?;
    let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let start_date = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1).expect("valid calendar date");

    let sql = format!(
        "select distinct
            first_value(Person.id) over w as person_id,
            first_value(Person.first_name) over w as first_name,
            first_value(Person.last_name) over w as last_name,
            first_value(Points.min_category) over w as min_category,
            first_value(Points.needs_upgrade) over w as needs_upgrade
         from Result
         join Person on Result.person_id = Person.id
         join Race on Result.race_id = Race.id
         join Event on Race.event_id = Event.id
         join Points on Points.result_id = Result.id
         where Event.discipline in ({placeholders}) and Race.date >= ?
         window w as (partition by Person.id order by Race.date desc, Race.created desc)"
    );
    let mut stmt = conn.prepare(&sql)?;
    struct Row {
        person_id: i64,
        first_name: String,
        last_name: String,
        min_category: i32,
        needs_upgrade: bool,
    }
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = event_disciplines.iter().map(|d| Box::new(*d) as Box<dyn rusqlite::ToSql>).collect();
    params.push(Box::new(start_date));
    let rows: Vec<Row> = stmt
        .query_map(rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())), |row| {
            Ok(Row {
                person_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                min_category: row.get(3)?,
                needs_upgrade: row.get(4)?,
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let mut pending = Vec::new();
    for row in rows {
        if !row.needs_upgrade {
            continue;
        }
        let obra_category: Option<i32> = conn
            .query_row(
                "select road_category from MemberSnapshot where person_id = ? and license is not null order by date desc limit 1",
                [row.person_id],
                |r| r.get(0),
            )
            .ok();
        // A rider with no site snapshot at all is excluded from the
        // roster, matching the site's own "is not None" gate; one whose
        // snapshot already shows a category below the threshold has
        // already been recognized there.
        if obra_category.map_or(true, |c| c < row.min_category) {
            continue;
        }
        pending.push(PendingRider {
            person_id: row.person_id,
            first_name: row.first_name,
            last_name: row.last_name,
            category: row.min_category,
        });
    }
    Ok(pending)
}

fn history_for(conn: &Connection, person_id: i64, upgrade_discipline: &str, since: NaiveDate) -> anyhow::Result<Vec<HistoryEntry>> {
    let event_disciplines = DISCIPLINE_MAP
        .get(upgrade_discipline)
        .ok_or_else(|| anyhow::anyhow!("unknown upgrade discipline: {upgrade_discipline}"))?;
    let placeholders = event_disciplines.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "select Race.name, Race.date, Result.place, Points.value, Points.notes
         from Result
         join Race on Result.race_id = Race.id
         join Event on Race.event_id = Event.id
         join Points on Points.result_id = Result.id
         where Result.person_id = ? and Event.discipline in ({placeholders}) and Race.date >= ?
         order by Race.date asc"
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(person_id)];
    for d in event_disciplines.iter() {
        params.push(Box::new(*d));
    }
    params.push(Box::new(since));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())), |row| {
            Ok(HistoryEntry {
                race_name: row.get(0)?,
                race_date: row.get(1)?,
                place: row.get(2)?,
                value: row.get(3)?,
                notes: row.get(4)?,
            })
        })?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}

/// Run the reporter for one upgrade-discipline: write the pending-upgrade
/// roster, then each pending rider's one-year history.
pub fn write_report(conn: &Connection, upgrade_discipline: &str, today: NaiveDate, writer: &mut dyn ReportWriter) -> anyhow::Result<()> {
    let riders = pending_riders(conn, upgrade_discipline, today)?;
    writer.write_pending(upgrade_discipline, &riders)?;

    let since = today - chrono::Duration::days(365);
    for rider in &riders {
        let history = history_for(conn, rider.person_id, upgrade_discipline, since)?;
        writer.write_history(rider, &history)?;
    }
    Ok(())
}

/// Discards output entirely - used for scheduler ticks that don't report.
pub struct NullWriter;

impl ReportWriter for NullWriter {
    fn write_pending(&mut self, _upgrade_discipline: &str, _riders: &[PendingRider]) -> anyhow::Result<()> {
        Ok(())
    }

    fn write_history(&mut self, _person: &PendingRider, _history: &[HistoryEntry]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Plain-text roster, one rider per line, history indented underneath.
pub struct TextWriter<W: std::io::Write> {
    pub out: W,
}

impl<W: std::io::Write> ReportWriter for TextWriter<W> {
    fn write_pending(&mut self, upgrade_discipline: &str, riders: &[PendingRider]) -> anyhow::Result<()> {
        writeln!(self.out, "== {upgrade_discipline}: riders needing upgrade ==")?;
        for rider in riders {
            writeln!(self.out, "{} {} (cat {})", rider.first_name, rider.last_name, rider.category)?;
        }
        Ok(())
    }

    fn write_history(&mut self, person: &PendingRider, history: &[HistoryEntry]) -> anyhow::Result<()> {
        writeln!(self.out, "-- {} {} --", person.first_name, person.last_name)?;
        for entry in history {
            writeln!(
                self.out,
                "  {} {} place {} value {} {}",
                entry.race_date, entry.race_name, entry.place, entry.value, entry.notes
            )?;
        }
        Ok(())
    }
}

/// HTML table roster, one `<table>` per rider history.
pub struct HtmlWriter<W: std::io::Write> {
    pub out: W,
}

impl<W: std::io::Write> ReportWriter for HtmlWriter<W> {
    fn write_pending(&mut self, upgrade_discipline: &str, riders: &[PendingRider]) -> anyhow::Result<()> {
        writeln!(self.out, "<h2>{upgrade_discipline}: riders needing upgrade</h2><ul>")?;
        for rider in riders {
            writeln!(self.out, "<li>{} {} (cat {})</li>", rider.first_name, rider.last_name, rider.category)?;
        }
        writeln!(self.out, "</ul>")?;
        Ok(())
    }

    fn write_history(&mut self, person: &PendingRider, history: &[HistoryEntry]) -> anyhow::Result<()> {
        writeln!(self.out, "<h3>{} {}</h3><table>", person.first_name, person.last_name)?;
        for entry in history {
            writeln!(
                self.out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                entry.race_date, entry.race_name, entry.place, entry.value, entry.notes
            )?;
        }
        writeln!(self.out, "</table>")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_database, Database, MemoryDatabase};

    fn seed(conn: &Connection, needs_upgrade: bool, category: i32, obra_category: Option<i32>) -> i64 {
        seed_on(conn, needs_upgrade, category, obra_category, "2020-06-01")
    }

    fn seed_on(conn: &Connection, needs_upgrade: bool, category: i32, obra_category: Option<i32>, race_date: &str) -> i64 {
        conn.execute(
            "insert into Event (name, discipline, year, date) values ('Test Event', 'road', 2020, '2020-01-01')",
            [],
        )
        .unwrap();
        let event_id = conn.last_insert_rowid();
        conn.execute(
            "insert into Race (event_id, name, date, categories, starters, created, updated)
             values (?, 'Open Road Race', ?, '[]', 30, ?, ?)",
            rusqlite::params![event_id, race_date, race_date, race_date],
        )
        .unwrap();
        let race_id = conn.last_insert_rowid();
        conn.execute("insert into Person (first_name, last_name) values ('Alice', 'Anderson')", []).unwrap();
        let person_id = conn.last_insert_rowid();
        conn.execute(
            "insert into Result (race_id, person_id, place) values (?, ?, '1')",
            rusqlite::params![race_id, person_id],
        )
        .unwrap();
        let result_id = conn.last_insert_rowid();
        conn.execute(
            "insert into Points (result_id, value, needs_upgrade, sum_categories, min_category) values (?, 7, ?, ?, ?)",
            rusqlite::params![result_id, needs_upgrade, format!("[{category}]"), category],
        )
        .unwrap();
        if let Some(oc) = obra_category {
            conn.execute(
                "insert into MemberSnapshot (date, person_id, license, road_category) values ('2020-05-01', ?, 1, ?)",
                rusqlite::params![person_id, oc],
            )
            .unwrap();
        }
        person_id
    }

    #[test]
    fn lists_riders_needing_upgrade_not_yet_recognized() {
        let db = MemoryDatabase::new("report_pending");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        // The site still shows the worse (higher-numbered) category, so
        // it hasn't recognized the upgrade yet.
        seed(&conn, true, 4, Some(5));

        let riders = pending_riders(&conn, "road", NaiveDate::from_ymd_opt(2020, 12, 1).unwrap()).unwrap();
        assert_eq!(riders.len(), 1);
        assert_eq!(riders[0].category, 4);
    }

    #[test]
    fn omits_riders_with_no_site_snapshot() {
        let db = MemoryDatabase::new("report_no_snapshot");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        seed(&conn, true, 4, None);

        let riders = pending_riders(&conn, "road", NaiveDate::from_ymd_opt(2020, 12, 1).unwrap()).unwrap();
        assert!(riders.is_empty());
    }

    #[test]
    fn omits_riders_already_recognized_by_the_site() {
        let db = MemoryDatabase::new("report_already_recognized");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        seed(&conn, true, 4, Some(3));

        let riders = pending_riders(&conn, "road", NaiveDate::from_ymd_opt(2020, 12, 1).unwrap()).unwrap();
        assert!(riders.is_empty());
    }

    #[test]
    fn includes_rider_whose_snapshot_still_equals_the_threshold() {
        let db = MemoryDatabase::new("report_equal_threshold");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        seed(&conn, true, 4, Some(4));

        let riders = pending_riders(&conn, "road", NaiveDate::from_ymd_opt(2020, 12, 1).unwrap()).unwrap();
        assert_eq!(riders.len(), 1);
    }

    #[test]
    fn omits_riders_who_dont_need_an_upgrade() {
        let db = MemoryDatabase::new("report_not_needed");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        seed(&conn, false, 4, None);

        let riders = pending_riders(&conn, "road", NaiveDate::from_ymd_opt(2020, 12, 1).unwrap()).unwrap();
        assert!(riders.is_empty());
    }

    #[test]
    fn omits_riders_whose_last_race_is_more_than_a_year_stale() {
        let db = MemoryDatabase::new("report_stale");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        seed_on(&conn, true, 4, Some(5), "2018-06-01");

        let riders = pending_riders(&conn, "road", NaiveDate::from_ymd_opt(2020, 12, 1).unwrap()).unwrap();
        assert!(riders.is_empty());
    }

    #[test]
    fn text_writer_produces_output() {
        let db = MemoryDatabase::new("report_text_writer");
        create_database(&db).unwrap();
        let conn = db.open().unwrap();
        seed(&conn, true, 4, Some(5));

        let mut buf = Vec::new();
        {
            let mut writer = TextWriter { out: &mut buf };
            write_report(&conn, "road", NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(), &mut writer).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Alice Anderson"));
        assert!(text.contains("Open Road Race"));
    }
}
