// Read-only adapter over the relational verse store
//
// Verses are written once by ingestion tooling and never mutated by the
// detection core; `insert_verse` exists for that tooling and for tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::DetectError;
use crate::types::Verse;

pub mod migrations;

use migrations::run_migrations;

/// Optional constraints for [`VerseStore::list`].
#[derive(Debug, Clone, Default)]
pub struct VerseFilter {
    pub book: Option<String>,
    pub chapter: Option<u32>,
    pub source_edition: Option<String>,
}

#[derive(Clone)]
pub struct VerseStore {
    conn: Arc<Mutex<Connection>>,
}

impl VerseStore {
    pub fn open(db_path: PathBuf) -> Result<Self, DetectError> {
        let conn = Connection::open(db_path)?;
        run_migrations(&conn)?;
        Ok(VerseStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests and local experiments.
    pub fn open_in_memory() -> Result<Self, DetectError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(VerseStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DetectError> {
        self.conn
            .lock()
            .map_err(|e| DetectError::ServiceUnavailable(format!("verse store lock error: {}", e)))
    }

    /// Look up a verse by its canonical display reference, e.g. "Matthew 5:3".
    /// A missing reference is `Ok(None)`, not an error.
    pub fn get_by_reference(&self, reference: &str) -> Result<Option<Verse>, DetectError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, reference, book, chapter, verse, greek_text, greek_normalized, source_edition
             FROM verses WHERE reference = ?1 LIMIT 1",
        )?;

        let mut rows = stmt.query_map([reference], row_to_verse)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List verses matching the filter, ordered by book, chapter, verse.
    pub fn list(&self, filter: &VerseFilter) -> Result<Vec<Verse>, DetectError> {
        let mut sql = String::from(
            "SELECT id, reference, book, chapter, verse, greek_text, greek_normalized, source_edition
             FROM verses WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(book) = &filter.book {
            sql.push_str(" AND book = ?");
            params.push(Box::new(book.clone()));
        }
        if let Some(chapter) = filter.chapter {
            sql.push_str(" AND chapter = ?");
            params.push(Box::new(chapter));
        }
        if let Some(source) = &filter.source_edition {
            sql.push_str(" AND source_edition = ?");
            params.push(Box::new(source.clone()));
        }
        sql.push_str(" ORDER BY book, chapter, verse");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            row_to_verse,
        )?;

        let mut verses = Vec::new();
        for row in rows {
            verses.push(row?);
        }
        Ok(verses)
    }

    /// Fetch verses by id, used by the retriever to hydrate vector hits.
    /// Ids with no matching row are simply absent from the map.
    pub fn get_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Verse>, DetectError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, reference, book, chapter, verse, greek_text, greek_normalized, source_edition
             FROM verses WHERE id IN ({})",
            placeholders
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), row_to_verse)?;

        let mut verses = HashMap::new();
        for row in rows {
            let verse = row?;
            verses.insert(verse.id, verse);
        }
        Ok(verses)
    }

    /// Number of stored verses, for health reporting.
    pub fn count(&self) -> Result<u64, DetectError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM verses", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert a verse. Used by ingestion tooling and tests; the detection
    /// core itself never writes. Returns the assigned row id.
    pub fn insert_verse(
        &self,
        reference: &str,
        book: &str,
        chapter: u32,
        verse: u32,
        greek_original: &str,
        greek_normalized: &str,
        source_edition: &str,
    ) -> Result<i64, DetectError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO verses (reference, book, chapter, verse, greek_text, greek_normalized, source_edition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                reference,
                book,
                chapter,
                verse,
                greek_original,
                greek_normalized,
                source_edition
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn row_to_verse(row: &rusqlite::Row<'_>) -> rusqlite::Result<Verse> {
    Ok(Verse {
        id: row.get(0)?,
        reference: row.get(1)?,
        book: row.get(2)?,
        chapter: row.get(3)?,
        verse: row.get(4)?,
        greek_original: row.get(5)?,
        greek_normalized: row.get(6)?,
        source_edition: row.get(7)?,
    })
}
