// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cache collaborator (spec.md §6) - a named-namespace invalidation hook
//! the engine calls after any discipline that produced new points. The
//! actual caching layer (the read API's HTTP response cache) is out of
//! scope, same treatment as `scraper::Scraper`.

pub trait Cache {
    fn clear(&self, namespace: &str) -> anyhow::Result<()>;
}

/// No-op cache, used in tests and whenever the read API isn't running.
pub struct NullCache;

impl Cache for NullCache {
    fn clear(&self, namespace: &str) -> anyhow::Result<()> {
        tracing::debug!(namespace, "NullCache: nothing to invalidate");
        Ok(())
    }
}
