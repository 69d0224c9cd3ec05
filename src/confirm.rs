// SPDX-License-Identifier: AGPL-3.0-or-later

//! Category-change confirmation (spec.md §4.5), shared by the state machine
//! (component D) and the pending-upgrade confirmer (component E).

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::scraper::Scraper;
use crate::snapshot::lookup_member_snapshot;

/// Check the external site to see if an upgrade or downgrade noted this
/// result has already been recognized there. Mutates the first note
/// containing `UPGRADED` or `DOWNGRADED` in place, appending
/// ` (CONFIRMED {date})` when confirmed. Returns the confirming
/// snapshot's id, if any. Only one note is ever confirmed per call.
pub fn confirm_category_change(
    conn: &Connection,
    scraper: &dyn Scraper,
    person_id: i64,
    race_date: NaiveDate,
    event_discipline: &str,
    sum_categories: &[i32],
    notes: &mut [String],
) -> anyhow::Result<Option<i64>> {
    let Some(snapshot) = lookup_member_snapshot(conn, scraper, person_id, race_date)? else {
        return Ok(None);
    };
    let Some(obra_category) = snapshot.category_for_discipline(event_discipline) else {
        return Ok(None);
    };
    let result_category = sum_categories.iter().copied().min().unwrap_or(9);

    for note in notes.iter_mut() {
        if note.contains("UPGRADED") {
            tracing::debug!(note = %note, "confirming upgrade");
            if obra_category <= result_category {
                note.push_str(&format!(" (CONFIRMED {})", snapshot.date));
                return Ok(Some(snapshot.id));
            }
            return Ok(None);
        }
        if note.contains("DOWNGRADED") {
            tracing::debug!(note = %note, "confirming downgrade");
            if obra_category >= result_category {
                note.push_str(&format!(" (CONFIRMED {})", snapshot.date));
                return Ok(Some(snapshot.id));
            }
            return Ok(None);
        }
    }
    Ok(None)
}
