// SPDX-License-Identifier: AGPL-3.0-or-later

//! Run one engine tick against a local database. Stands in for the
//! scheduler (out of scope per spec.md §1): in production this binary
//! would be invoked by a fixed-interval timer, alternating `--mode=full`
//! (~every 10 min) and `--mode=recent` (~every 30 min).

use std::path::PathBuf;

use chrono::Datelike;
use clap::{Parser, ValueEnum};

use obra_upgrades::cache::NullCache;
use obra_upgrades::db::{create_database, LocalDatabase};
use obra_upgrades::engine_tick::Engine;
use obra_upgrades::scraper::NullScraper;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    Full,
    Recent,
}

#[derive(Parser, Debug)]
#[command(name = "obra-tick")]
struct Opt {
    #[arg(long, default_value = "ov.sqlite3")]
    database: PathBuf,

    #[arg(long, value_enum, default_value = "recent")]
    mode: Mode,

    #[arg(long, default_value_t = 7)]
    recent_days: i64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::parse();

    let db = LocalDatabase::new(opt.database);
    create_database(&db)?;

    // NullScraper/NullCache stand in for the real collaborators (spec.md
    // §6), out of scope here; a production deployment wires in the real
    // scraper and the read API's cache.
    let mut engine = Engine::new();
    match opt.mode {
        Mode::Full => {
            let current_year = chrono::Local::now().year();
            engine.tick_full(&db, &NullScraper, &NullCache, current_year)?;
        }
        Mode::Recent => {
            engine.tick_recent(&db, &NullScraper, &NullCache, opt.recent_days)?;
        }
    }

    Ok(())
}
