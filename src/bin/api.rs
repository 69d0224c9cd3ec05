// SPDX-License-Identifier: AGPL-3.0-or-later

//! Minimal read-only JSON projection (spec.md §1's "small read-only HTTP
//! JSON API", explicitly non-core). CGI-based like `ov-cup`'s `cup-cgi`
//! binary, and deliberately just as thin - it does not attempt to
//! reproduce the full `obra_hacks/api/*` surface.

use std::collections::HashMap;
use std::path::Path;

use obra_upgrades::db::{Database, LocalDatabase};
use obra_upgrades::report::{pending_riders, PendingRider};

fn pending_for_discipline(db: &dyn Database, discipline: &str) -> anyhow::Result<Vec<PendingRider>> {
    let conn = db.open()?;
    let today = chrono::Local::now().date_naive();
    pending_riders(&conn, discipline, today)
}

pub fn main() {
    cgi::handle(|request| {
        let query = request.uri().query().unwrap_or("");
        let params: HashMap<_, _> = form_urlencoded::parse(query.as_bytes()).into_owned().collect();

        let discipline = match params.get("discipline") {
            Some(discipline) => discipline.to_string(),
            None => return cgi::text_response(400, "missing parameter 'discipline'"),
        };

        let db = LocalDatabase::new(Path::new("ov.sqlite3").to_path_buf());
        cgi::err_to_500(pending_for_discipline(&db, &discipline).map(|pending| {
            let body = serde_json::to_vec(&pending).unwrap();
            cgi::binary_response(200, "application/json", body)
        }))
    })
}
