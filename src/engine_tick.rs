// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-tick orchestration (spec.md §5), mirroring `obra_hacks/app/tasks.py`'s
//! `scrape_events`/`scrape_recent` structure: one immediate transaction per
//! upgrade-discipline, nested savepoints for the C -> D -> F -> E stages,
//! cache invalidation only when a discipline produced new points.

use rusqlite::TransactionBehavior;

use crate::cache::Cache;
use crate::db::Database;
use crate::discipline::DISCIPLINE_MAP;
use crate::engine::sum_points;
use crate::pending::confirm_pending_upgrades;
use crate::points::recalculate_points;
use crate::ranking::{DefaultQualityPolicy, QualityPolicy};
use crate::scraper::Scraper;

/// Coordinates full and recent-only ticks. Holds the process-wide
/// "full scrape completed" flag from spec.md §5, which determines whether
/// the next tick scans the last seven years or only the current year; it
/// resets every time the process restarts.
pub struct Engine {
    full_scrape_done: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine { full_scrape_done: false }
    }

    /// Run the long-period "full scrape" tick: the first call scans the
    /// last seven years for every discipline; subsequent calls scan only
    /// the current year, matching `tasks.py::scrape_events`.
    pub fn tick_full(
        &mut self,
        db: &dyn Database,
        scraper: &dyn Scraper,
        cache: &dyn Cache,
        current_year: i32,
    ) -> anyhow::Result<()> {
        let years: Vec<i32> = if self.full_scrape_done {
            vec![current_year]
        } else {
            ((current_year - 6)..=current_year).collect()
        };

        for upgrade_discipline in DISCIPLINE_MAP.keys().copied() {
            for &year in &years {
                for event_discipline in DISCIPLINE_MAP[upgrade_discipline].iter().copied() {
                    scraper.scrape_year(year, event_discipline)?;
                    scraper.scrape_parents(year, event_discipline)?;
                    scraper.clean_events(year, event_discipline)?;
                }
            }
            self.process_discipline(db, scraper, cache, upgrade_discipline, false)?;
        }

        self.full_scrape_done = true;
        Ok(())
    }

    /// Run the short-period "recent-only" tick: matches
    /// `tasks.py::scrape_recent`, incrementally scanning the last `days`
    /// days for each discipline.
    pub fn tick_recent(&mut self, db: &dyn Database, scraper: &dyn Scraper, cache: &dyn Cache, days: i64) -> anyhow::Result<()> {
        for upgrade_discipline in DISCIPLINE_MAP.keys().copied() {
            let mut changed = false;
            for event_discipline in DISCIPLINE_MAP[upgrade_discipline].iter().copied() {
                changed |= scraper.scrape_new(event_discipline)?;
                changed |= scraper.scrape_recent(event_discipline, days)?;
            }
            if changed {
                self.process_discipline(db, scraper, cache, upgrade_discipline, true)?;
            }
        }
        Ok(())
    }

    fn process_discipline(
        &self,
        db: &dyn Database,
        scraper: &dyn Scraper,
        cache: &dyn Cache,
        upgrade_discipline: &str,
        incremental: bool,
    ) -> anyhow::Result<()> {
        let mut conn = db.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result: anyhow::Result<i64> = (|| {
            let points_created = {
                let sp = tx.savepoint()?;
                let created = recalculate_points(&sp, upgrade_discipline, incremental)?;
                sp.commit()?;
                created
            };
            {
                let sp = tx.savepoint()?;
                sum_points(&sp, scraper, upgrade_discipline)?;
                sp.commit()?;
            }
            {
                let sp = tx.savepoint()?;
                crate::ranking::recalculate_ranks(&sp, upgrade_discipline, &DefaultQualityPolicy as &dyn QualityPolicy)?;
                sp.commit()?;
            }
            {
                let sp = tx.savepoint()?;
                confirm_pending_upgrades(&sp, scraper, upgrade_discipline)?;
                sp.commit()?;
            }
            Ok(points_created)
        })();

        match result {
            Ok(points_created) => {
                tx.commit()?;
                if points_created > 0 {
                    cache.clear(upgrade_discipline)?;
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!(upgrade_discipline, error = %err, "discipline tick failed, rolling back");
                tx.rollback()?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullCache;
    use crate::db::{create_database, MemoryDatabase};
    use crate::scraper::NullScraper;

    #[test]
    fn full_tick_marks_itself_done_and_narrows_scan_window() {
        let db = MemoryDatabase::new("engine_tick_full");
        create_database(&db).unwrap();

        let mut engine = Engine::new();
        assert!(!engine.full_scrape_done);
        engine.tick_full(&db, &NullScraper, &NullCache, 2020).unwrap();
        assert!(engine.full_scrape_done);
    }

    #[test]
    fn recent_tick_skips_disciplines_with_no_new_data() {
        let db = MemoryDatabase::new("engine_tick_recent");
        create_database(&db).unwrap();

        let mut engine = Engine::new();
        engine.tick_recent(&db, &NullScraper, &NullCache, 1).unwrap();
    }
}
