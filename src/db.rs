// Database connections

// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use rusqlite::{Connection, OpenFlags};

/// Storage collaborator (component A): a transactional relational store.
///
/// Abstracted behind a trait the same way the teacher abstracts a SQLite
/// file behind `LocalDatabase`, so the engine can run against an in-memory
/// connection in tests.
pub trait Database {
    fn open(&self) -> anyhow::Result<Connection>;
}

pub struct LocalDatabase {
    path: PathBuf,
}

impl LocalDatabase {
    pub fn new(path: PathBuf) -> Self {
        LocalDatabase { path }
    }
}

impl Database for LocalDatabase {
    fn open(&self) -> anyhow::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        apply_pragmas(&conn)?;
        Ok(conn)
    }
}

/// An in-memory database, used by tests and by anything that wants a
/// throwaway scratch engine (report previews, scenario replay).
///
/// Backed by a named shared-cache URI rather than a bare `:memory:`
/// connection, so repeated `open()` calls (one per pipeline stage, per
/// spec.md's savepoint-per-stage design) see the same database instead of
/// each getting a private empty one.
pub struct MemoryDatabase {
    uri: String,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Self {
        MemoryDatabase {
            uri: format!("file:{name}?mode=memory&cache=shared"),
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new("obra-test")
    }
}

impl Database for MemoryDatabase {
    fn open(&self) -> anyhow::Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.pragma_update(None, "foreign_keys", "on")?;
        Ok(conn)
    }
}

fn apply_pragmas(conn: &Connection) -> anyhow::Result<()> {
    conn.pragma_update(None, "foreign_keys", "on")?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "locking_mode", "NORMAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "auto_vacuum", "NONE")?;
    Ok(())
}

/// Create every table in the schema (component A), matching spec.md §3 and
/// §6's persisted state layout.
pub fn create_database(db: &dyn Database) -> anyhow::Result<()> {
    let conn = db.open()?;
    conn.execute_batch(
        "
        create table if not exists Series (
            id integer primary key autoincrement,
            name text not null,
            year integer not null,
            dates text not null
        );

        create table if not exists Event (
            id integer primary key autoincrement,
            name text not null,
            discipline text not null,
            year integer not null,
            date text not null,
            series_id integer references Series(id),
            parent_id integer references Event(id),
            ignore integer not null default 0
        );
        create index if not exists idx_event_discipline on Event(discipline);

        create table if not exists Race (
            id integer primary key autoincrement,
            event_id integer not null references Event(id),
            name text not null,
            date text not null,
            categories text not null default '[]',
            starters integer not null default 0,
            created text not null,
            updated text not null
        );
        create index if not exists idx_race_name on Race(name);
        create index if not exists idx_race_event on Race(event_id);

        create table if not exists Person (
            id integer primary key autoincrement,
            first_name text not null,
            last_name text not null,
            team_name text not null default ''
        );

        create table if not exists MemberSnapshot (
            id integer primary key autoincrement,
            date text not null,
            person_id integer not null references Person(id),
            license integer,
            mtb_category integer not null default 3,
            dh_category integer not null default 3,
            ccx_category integer not null default 5,
            road_category integer not null default 5,
            track_category integer not null default 5,
            unique(date, person_id)
        );

        create table if not exists Result (
            id integer primary key autoincrement,
            race_id integer not null references Race(id),
            person_id integer references Person(id),
            place text not null,
            time integer,
            laps integer
        );
        create index if not exists idx_result_place on Result(place);
        create index if not exists idx_result_race on Result(race_id);
        create index if not exists idx_result_person on Result(person_id);

        create table if not exists Points (
            result_id integer primary key references Result(id),
            value integer not null default 0,
            notes text not null default '',
            needs_upgrade integer not null default 0,
            upgrade_confirmation integer references MemberSnapshot(id),
            sum_value integer not null default 0,
            sum_categories text not null default '[]',
            min_category integer not null default 9
        );

        create table if not exists PendingUpgrade (
            result_id integer primary key references Result(id),
            upgrade_confirmation integer not null references MemberSnapshot(id),
            discipline text not null
        );
        create index if not exists idx_pending_discipline on PendingUpgrade(discipline);

        create table if not exists Rank (
            result_id integer primary key references Result(id),
            value real not null
        );

        create table if not exists Quality (
            id integer primary key autoincrement,
            race_id integer not null references Race(id),
            value real not null,
            points_per_place real not null
        );
        ",
    )?;
    Ok(())
}
