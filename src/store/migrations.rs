// Verse store schema

use rusqlite::{Connection, Result};

pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Track schema version so future migrations apply once
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_current_version(conn)?;

    if current_version < 1 {
        migration_001_verses(conn)?;
        set_version(conn, 1)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}

fn set_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

fn migration_001_verses(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS verses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reference TEXT NOT NULL,
            book TEXT NOT NULL,
            chapter INTEGER NOT NULL,
            verse INTEGER NOT NULL,
            greek_text TEXT NOT NULL,
            greek_normalized TEXT NOT NULL,
            source_edition TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(book, chapter, verse, source_edition)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_verses_reference ON verses(reference)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_verses_book_chapter ON verses(book, chapter)",
        [],
    )?;

    Ok(())
}
