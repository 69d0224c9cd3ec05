// SPDX-License-Identifier: AGPL-3.0-or-later

//! Offline ingestion: load a JSON dump of already-scraped race results into
//! the database. Stands in for the real scraper (out of scope), the same
//! way `ov-cup`'s `load` binary reads a webres JSON export instead of
//! talking to the upstream site directly.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use obra_upgrades::cli;
use obra_upgrades::db::{create_database, Database, LocalDatabase};

#[derive(Parser, Debug)]
#[command(name = "obra-load")]
struct Opt {
    #[arg(long, default_value = "ov.sqlite3")]
    database: PathBuf,

    #[arg(long, value_parser = cli::parse_discipline)]
    discipline: Option<String>,

    #[arg(name = "FILE", required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct LoadedResult {
    first_name: String,
    last_name: String,
    place: String,
}

#[derive(Debug, Deserialize)]
struct LoadedRace {
    event_name: String,
    discipline: String,
    year: i32,
    event_date: String,
    race_name: String,
    race_date: String,
    #[serde(default)]
    categories: Vec<i32>,
    #[serde(default)]
    starters: i64,
    results: Vec<LoadedResult>,
}

fn read_race_json(path: &Path) -> anyhow::Result<LoadedRace> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

fn store_race(conn: &rusqlite::Connection, race: &LoadedRace) -> anyhow::Result<()> {
    conn.execute(
        "insert into Event (name, discipline, year, date) values (?, ?, ?, ?)
         on conflict do nothing",
        rusqlite::params![race.event_name, race.discipline, race.year, race.event_date],
    )?;
    let event_id: i64 = conn.query_row(
        "select id from Event where name = ? and discipline = ? and date = ?",
        rusqlite::params![race.event_name, race.discipline, race.event_date],
        |row| row.get(0),
    )?;

    let categories_json = serde_json::to_string(&race.categories)?;
    conn.execute(
        "insert into Race (event_id, name, date, categories, starters, created, updated)
         values (?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![event_id, race.race_name, race.race_date, categories_json, race.starters, race.race_date, race.race_date],
    )?;
    let race_id = conn.last_insert_rowid();

    for result in &race.results {
        conn.execute(
            "insert into Person (first_name, last_name) values (?, ?) on conflict do nothing",
            rusqlite::params![result.first_name, result.last_name],
        )?;
        let person_id: i64 = conn.query_row(
            "select id from Person where first_name = ? and last_name = ?",
            rusqlite::params![result.first_name, result.last_name],
            |row| row.get(0),
        )?;
        conn.execute(
            "insert into Result (race_id, person_id, place) values (?, ?, ?)",
            rusqlite::params![race_id, person_id, result.place],
        )?;
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::parse();

    let db = LocalDatabase::new(opt.database);
    create_database(&db)?;
    let conn = db.open()?;

    for path in &opt.paths {
        let race = read_race_json(path)?;
        if let Some(discipline) = &opt.discipline {
            if !obra_upgrades::discipline::DISCIPLINE_MAP[discipline.as_str()].contains(&race.discipline.as_str()) {
                tracing::warn!(path = %path.display(), race_discipline = %race.discipline, "race discipline doesn't belong to the requested upgrade discipline, loading anyway");
            }
        }
        tracing::info!(path = %path.display(), race = %race.race_name, "loaded race");
        store_race(&conn, &race)?;
    }

    Ok(())
}
