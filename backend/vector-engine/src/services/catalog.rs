// Versioned genre snapshot cache.
//
// The encoder sizes its one-hot genre block to the current genre count, so
// every encode call needs a consistent view of the genre table. Rather than a
// process-wide mutable set, readers get an immutable `Arc<GenreSnapshot>`;
// writes invalidate the cache and the next read loads a fresh snapshot under
// a bumped version.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::db::GenreRepository;
use crate::error::Result;
use crate::models::Genre;

/// Immutable view of the genre table at one point in time.
#[derive(Debug)]
pub struct GenreSnapshot {
    version: u64,
    genres: Vec<Genre>,
    index: HashMap<i64, usize>,
}

impl GenreSnapshot {
    pub fn new(version: u64, genres: Vec<Genre>) -> Self {
        let index = genres
            .iter()
            .enumerate()
            .map(|(pos, genre)| (genre.id, pos))
            .collect();
        Self {
            version,
            genres,
            index,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.genres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
    }

    /// Position of a genre id within the one-hot block, if known.
    pub fn position(&self, genre_id: i64) -> Option<usize> {
        self.index.get(&genre_id).copied()
    }

    pub fn genres(&self) -> &[Genre] {
        &self.genres
    }
}

pub struct GenreCatalog {
    repo: GenreRepository,
    cached: RwLock<Option<Arc<GenreSnapshot>>>,
    version: AtomicU64,
}

impl GenreCatalog {
    pub fn new(repo: GenreRepository) -> Self {
        Self {
            repo,
            cached: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Current snapshot, loading from the database on first use or after an
    /// invalidation.
    pub async fn snapshot(&self) -> Result<Arc<GenreSnapshot>> {
        if let Some(snapshot) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut guard = self.cached.write().await;
        // Another task may have reloaded while we waited for the write lock.
        if let Some(snapshot) = guard.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let genres = self.repo.all_genres().await?;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(GenreSnapshot::new(version, genres));
        debug!(
            version = snapshot.version(),
            genres = snapshot.len(),
            "Loaded genre snapshot"
        );

        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop the cached snapshot. Called after any genre table write.
    pub async fn invalidate(&self) {
        let mut guard = self.cached.write().await;
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genre(id: i64, name: &str) -> Genre {
        Genre {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_snapshot_positions_follow_insertion_order() {
        let snapshot = GenreSnapshot::new(
            1,
            vec![genre(28, "Action"), genre(35, "Comedy"), genre(18, "Drama")],
        );

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.position(28), Some(0));
        assert_eq!(snapshot.position(35), Some(1));
        assert_eq!(snapshot.position(18), Some(2));
        assert_eq!(snapshot.position(99), None);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = GenreSnapshot::new(1, Vec::new());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.position(1), None);
    }
}
