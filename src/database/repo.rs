use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::database::schema::SCHEMA;
use crate::source::Source;

#[derive(Debug, Clone, PartialEq)]
pub struct BookRecord {
    pub id: i64,
    pub booklore_id: i64,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub romance_io_id: Option<String>,
    pub booknaut_id: Option<String>,
    pub last_scraped_at: Option<String>,
}

impl BookRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            booklore_id: row.get("booklore_id")?,
            title: row.get("title")?,
            author: row.get("author")?,
            isbn: row.get("isbn")?,
            romance_io_id: row.get("romance_io_id")?,
            booknaut_id: row.get("booknaut_id")?,
            last_scraped_at: row.get("last_scraped_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intensity {
    pub level: u8,
    pub label: Option<String>,
}

/// A cached book together with everything scraped for it.
#[derive(Debug, Clone)]
pub struct EnrichedBook {
    pub book: BookRecord,
    pub tags: Vec<TagRecord>,
    pub intensity: Option<Intensity>,
}

#[derive(Debug, Clone)]
pub struct NewDiscovery {
    pub title: String,
    pub source: Source,
    pub source_id: String,
    pub source_url: Option<String>,
    pub genre: Option<String>,
    pub steam_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub id: i64,
    pub title: String,
    pub source: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub genre: Option<String>,
    pub steam_level: Option<u8>,
    pub discovered_at: String,
    pub dismissed: bool,
}

impl Discovery {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            source: row.get("source")?,
            source_id: row.get("source_id")?,
            source_url: row.get("source_url")?,
            genre: row.get("genre")?,
            steam_level: row.get("steam_level")?,
            discovered_at: row.get("discovered_at")?,
            dismissed: row.get("dismissed")?,
        })
    }
}

/// Local SQLite cache of library books and their scraped metadata.
///
/// Every write runs in autocommit mode, so an interrupted run leaves the
/// cache consistent but possibly behind the remote library.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory {:?}", parent))?;
        }
        let conn = Connection::open(path).context("Failed to open database")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Cache journal mode: {}", mode);
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA).context("Failed to initialize schema")?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Inserts a book or overwrites title/author/isbn of the existing row.
    /// External ids and the scrape timestamp are left untouched.
    pub fn upsert_book(
        &self,
        booklore_id: i64,
        title: &str,
        author: &str,
        isbn: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO books (booklore_id, title, author, isbn)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(booklore_id) DO UPDATE SET
                     title=excluded.title, author=excluded.author, isbn=excluded.isbn",
                params![booklore_id, title, author, isbn],
            )
            .with_context(|| format!("Failed to upsert book {}", booklore_id))?;
        Ok(())
    }

    pub fn book_by_booklore_id(&self, booklore_id: i64) -> Result<Option<BookRecord>> {
        let book = self
            .conn
            .query_row(
                "SELECT * FROM books WHERE booklore_id = ?1",
                params![booklore_id],
                BookRecord::from_row,
            )
            .optional()?;
        Ok(book)
    }

    pub fn get_or_create_tag(&self, name: &str, category: &str, source: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        self.conn
            .execute(
                "INSERT INTO tags (name, category, source) VALUES (?1, ?2, ?3)",
                params![name, category, source],
            )
            .with_context(|| format!("Failed to create tag '{}'", name))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_book_tag(&self, book_id: i64, tag_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO book_tags (book_id, tag_id) VALUES (?1, ?2)",
            params![book_id, tag_id],
        )?;
        Ok(())
    }

    /// Tags linked to a book, in the order they were linked.
    pub fn book_tags(&self, book_id: i64) -> Result<Vec<TagRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, t.category, t.source FROM tags t
             JOIN book_tags bt ON bt.tag_id = t.id
             WHERE bt.book_id = ?1
             ORDER BY bt.rowid",
        )?;
        let tags = stmt
            .query_map(params![book_id], |row| {
                Ok(TagRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    category: row.get(2)?,
                    source: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    pub fn set_intensity(&self, book_id: i64, level: u8, label: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO book_steam (book_id, level, label) VALUES (?1, ?2, ?3)
             ON CONFLICT(book_id) DO UPDATE SET level=excluded.level, label=excluded.label",
            params![book_id, level, label],
        )?;
        Ok(())
    }

    pub fn intensity(&self, book_id: i64) -> Result<Option<Intensity>> {
        let intensity = self
            .conn
            .query_row(
                "SELECT level, label FROM book_steam WHERE book_id = ?1",
                params![book_id],
                |row| {
                    Ok(Intensity {
                        level: row.get(0)?,
                        label: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(intensity)
    }

    /// Records the external id for `source`, which marks the book as done
    /// for that site.
    pub fn mark_scraped(&self, book_id: i64, source: Source, external_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE books SET {} = ?1, last_scraped_at = ?2 WHERE id = ?3",
            source.id_column()
        );
        self.conn.execute(&sql, params![external_id, now, book_id])?;
        Ok(())
    }

    pub fn unscraped_books(&self, source: Source) -> Result<Vec<BookRecord>> {
        let sql = format!(
            "SELECT * FROM books WHERE {} IS NULL ORDER BY id",
            source.id_column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let books = stmt
            .query_map([], BookRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(books)
    }

    pub fn known_external_ids(&self, source: Source) -> Result<HashSet<String>> {
        let col = source.id_column();
        let sql = format!("SELECT {col} FROM books WHERE {col} IS NOT NULL");
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(ids)
    }

    /// Books with at least one tag or an intensity rating.
    pub fn enriched_books(&self) -> Result<Vec<EnrichedBook>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.* FROM books b
             WHERE EXISTS (SELECT 1 FROM book_tags bt WHERE bt.book_id = b.id)
                OR EXISTS (SELECT 1 FROM book_steam bs WHERE bs.book_id = b.id)
             ORDER BY b.id",
        )?;
        let books = stmt
            .query_map([], BookRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        books
            .into_iter()
            .map(|book| {
                let tags = self.book_tags(book.id)?;
                let intensity = self.intensity(book.id)?;
                Ok(EnrichedBook { book, tags, intensity })
            })
            .collect()
    }

    /// Stores a discovery; returns false when (source, source_id) was already
    /// recorded.
    pub fn add_discovery(&self, discovery: &NewDiscovery) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO discoveries
                 (title, source, source_id, source_url, genre, steam_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                discovery.title,
                discovery.source.key(),
                discovery.source_id,
                discovery.source_url,
                discovery.genre,
                discovery.steam_level
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn list_discoveries(
        &self,
        source: Option<Source>,
        include_dismissed: bool,
    ) -> Result<Vec<Discovery>> {
        let mut sql = String::from("SELECT * FROM discoveries WHERE 1=1");
        if source.is_some() {
            sql.push_str(" AND source = ?1");
        }
        if !include_dismissed {
            sql.push_str(" AND dismissed = 0");
        }
        sql.push_str(" ORDER BY discovered_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match source {
            Some(src) => stmt.query_map(params![src.key()], Discovery::from_row)?,
            None => stmt.query_map([], Discovery::from_row)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn dismiss_discovery(&self, discovery_id: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE discoveries SET dismissed = 1 WHERE id = ?1",
            params![discovery_id],
        )?;
        Ok(updated > 0)
    }
}
