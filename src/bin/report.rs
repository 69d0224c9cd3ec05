// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use obra_upgrades::cli;
use obra_upgrades::db::{Database, LocalDatabase};
use obra_upgrades::report::{write_report, HtmlWriter, ReportWriter, TextWriter};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Format {
    Text,
    Html,
}

#[derive(Parser, Debug)]
#[command(name = "obra-report")]
struct Opt {
    #[arg(long, default_value = "ov.sqlite3")]
    database: PathBuf,

    #[arg(long, default_value = "cyclocross", value_parser = cli::parse_discipline)]
    discipline: String,

    #[arg(long, value_enum, default_value = "text")]
    format: Format,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::parse();

    let db = LocalDatabase::new(opt.database);
    let conn = db.open()?;
    let today = chrono::Local::now().date_naive();

    let stdout = std::io::stdout();
    let mut writer: Box<dyn ReportWriter + '_> = match opt.format {
        Format::Text => Box::new(TextWriter { out: stdout.lock() }),
        Format::Html => Box::new(HtmlWriter { out: stdout.lock() }),
    };
    write_report(&conn, &opt.discipline, today, writer.as_mut())?;

    Ok(())
}
