use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;
use tracing::debug;

use super::filter::is_qualified;
use crate::proto::{Filter, Laptop};
use crate::{CallContext, Error, Result};

/// In-memory laptop catalog.
///
/// Every laptop crossing the store boundary is cloned, so callers never
/// share storage with the catalog. A single reader/writer lock guards the
/// whole keyspace.
#[derive(Debug, Default)]
pub struct LaptopStore {
    laptops: RwLock<HashMap<String, Laptop>>,
}

impl LaptopStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a copy of `laptop` under its ID.
    ///
    /// Fails with [`Error::AlreadyExists`] if the ID is taken; the stored
    /// laptop is left untouched.
    pub async fn save(&self, laptop: &Laptop) -> Result<()> {
        let mut laptops = self.laptops.write().await;

        if laptops.contains_key(&laptop.id) {
            return Err(Error::AlreadyExists(format!("laptop {}", laptop.id)));
        }

        laptops.insert(laptop.id.clone(), laptop.clone());
        Ok(())
    }

    /// Returns a copy of the laptop stored under `id`.
    pub async fn find(&self, id: &str) -> Result<Laptop> {
        let laptops = self.laptops.read().await;
        laptops
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("laptop {id}")))
    }

    /// Returns true if a laptop is stored under `id`.
    pub async fn contains(&self, id: &str) -> bool {
        self.laptops.read().await.contains_key(id)
    }

    /// Returns the number of stored laptops.
    pub async fn count(&self) -> usize {
        self.laptops.read().await.len()
    }

    /// Calls `on_match` with a copy of every laptop that satisfies `filter`.
    ///
    /// Matches are copied out under the read lock, which is released before
    /// the first callback, so a slow `on_match` never holds up writers. The
    /// call context is checked before each laptop; once it is cancelled or
    /// past its deadline the search stops without further callbacks. An
    /// error from `on_match` stops the search and is returned as is.
    /// Iteration order is unspecified.
    pub async fn search<F, Fut>(
        &self,
        ctx: &CallContext,
        filter: &Filter,
        mut on_match: F,
    ) -> Result<()>
    where
        F: FnMut(Laptop) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let matches: Vec<Laptop> = {
            let laptops = self.laptops.read().await;
            let mut matches = Vec::new();
            for laptop in laptops.values() {
                ctx.check()?;
                if is_qualified(filter, laptop) {
                    matches.push(laptop.clone());
                }
            }
            matches
        };
        debug!(matches = matches.len(), "search snapshot taken");

        for laptop in matches {
            if let Some(err) = ctx.err() {
                debug!(error = %err, "search stopped");
                return Err(err);
            }

            on_match(laptop).await?;
        }

        Ok(())
    }
}
