// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scraper collaborator (spec.md §6) - out of scope, expressed as a trait
//! the same way `db::Database` abstracts the storage collaborator, so the
//! engine can run against a stub in tests and demos.

use rusqlite::Connection;

pub trait Scraper {
    fn scrape_year(&self, year: i32, discipline: &str) -> anyhow::Result<()>;
    fn scrape_parents(&self, year: i32, discipline: &str) -> anyhow::Result<()>;
    fn clean_events(&self, year: i32, discipline: &str) -> anyhow::Result<()>;
    fn scrape_new(&self, discipline: &str) -> anyhow::Result<bool>;
    fn scrape_recent(&self, discipline: &str, days: i64) -> anyhow::Result<bool>;
    /// Populate a fresh MemberSnapshot row for `person_id`, dated today.
    fn scrape_person(&self, conn: &Connection, person_id: i64) -> anyhow::Result<()>;
}

/// A no-op stand-in for the real (out-of-scope) web scraper. Used in tests
/// and for offline replay of already-ingested data.
pub struct NullScraper;

impl Scraper for NullScraper {
    fn scrape_year(&self, _year: i32, _discipline: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn scrape_parents(&self, _year: i32, _discipline: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn clean_events(&self, _year: i32, _discipline: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn scrape_new(&self, _discipline: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn scrape_recent(&self, _discipline: &str, _days: i64) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn scrape_person(&self, _conn: &Connection, person_id: i64) -> anyhow::Result<()> {
        tracing::debug!(person_id, "NullScraper: no external data available for person");
        Ok(())
    }
}
