//! SQLite metadata store for sources, characters, and images.
//!
//! Schema:
//! - sources: one row per ingested document (title, author, format, state)
//! - characters: one row per canonical character, owned by a source
//! - images: one row per generated portrait, owned by a character
//!
//! Foreign keys cascade: deleting a source deletes its characters, which
//! deletes their images, matching the ownership tree in the data model.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoryMindError};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    normalized_title TEXT NOT NULL UNIQUE,
    author TEXT,
    format TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    failure_reason TEXT,
    window_count INTEGER NOT NULL DEFAULT 0,
    character_count INTEGER NOT NULL DEFAULT 0,
    index_path TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS characters (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    mention_count INTEGER NOT NULL DEFAULT 0,
    seed INTEGER NOT NULL,
    relationships TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (source_id) REFERENCES sources(id) ON DELETE CASCADE,
    UNIQUE (source_id, name)
);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY,
    character_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    prompt TEXT NOT NULL,
    style TEXT NOT NULL,
    aspect_ratio TEXT NOT NULL,
    outcome TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (character_id) REFERENCES characters(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_characters_source_id ON characters(source_id);
CREATE INDEX IF NOT EXISTS idx_images_character_id ON images(character_id);
";

/// A row in `sources`.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub format: String,
    pub state: SourceState,
    pub failure_reason: Option<String>,
    pub window_count: i64,
    pub character_count: i64,
    pub index_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SourceState {
    fn as_str(&self) -> &'static str {
        match self {
            SourceState::Pending => "pending",
            SourceState::Processing => "processing",
            SourceState::Completed => "completed",
            SourceState::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "processing" => SourceState::Processing,
            "completed" => SourceState::Completed,
            "failed" => SourceState::Failed,
            _ => SourceState::Pending,
        }
    }
}

/// A row in `characters`.
#[derive(Debug, Clone)]
pub struct CharacterRow {
    pub id: i64,
    pub source_id: i64,
    pub name: String,
    pub description: String,
    pub mention_count: i64,
    pub seed: i64,
}

/// A row in `images`.
#[derive(Debug, Clone)]
pub struct ImageRow {
    pub id: i64,
    pub character_id: i64,
    pub path: String,
    pub prompt: String,
    pub style: String,
    pub aspect_ratio: String,
    pub outcome: String,
    pub duration_ms: i64,
}

/// Normalize a title for the uniqueness check: trim and lowercase. This is
/// an application-level rule, not expressible as a raw SQL unique index.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Metadata store wrapping a single SQLite connection.
pub struct DB {
    conn: Connection,
}

impl DB {
    /// Open or create the database at `path`.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoryMindError::from)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert a new pending source, or supersede an existing one with the
    /// same normalized title (cascading delete of its characters/images via
    /// foreign keys, and the caller is responsible for removing its on-disk
    /// index and image files before calling this).
    ///
    /// The delete-then-insert runs under a savepoint so a prior source is
    /// never left deleted without its replacement committed alongside it.
    pub fn upsert_pending_source(
        &self,
        title: &str,
        author: Option<&str>,
        format: &str,
    ) -> Result<i64> {
        let normalized = normalize_title(title);

        self.conn.execute("SAVEPOINT upsert_source", [])?;
        let result = (|| -> Result<i64> {
            let existing: Option<i64> = self
                .conn
                .query_row(
                    "SELECT id FROM sources WHERE normalized_title = ?1",
                    params![normalized],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                self.conn
                    .execute("DELETE FROM sources WHERE id = ?1", params![id])?;
            }

            self.conn.execute(
                "INSERT INTO sources (title, normalized_title, author, format, state)
                 VALUES (?1, ?2, ?3, ?4, 'pending')",
                params![title, normalized, author, format],
            )?;
            Ok(self.conn.last_insert_rowid())
        })();

        match result {
            Ok(id) => {
                self.conn.execute("RELEASE SAVEPOINT upsert_source", [])?;
                Ok(id)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK TO SAVEPOINT upsert_source", []);
                let _ = self.conn.execute("RELEASE SAVEPOINT upsert_source", []);
                Err(e)
            }
        }
    }

    pub fn set_source_processing(&self, source_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE sources SET state = 'processing' WHERE id = ?1",
            params![source_id],
        )?;
        Ok(())
    }

    pub fn set_source_completed(
        &self,
        source_id: i64,
        window_count: usize,
        character_count: usize,
        index_path: &str,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sources
             SET state = 'completed', window_count = ?2, character_count = ?3, index_path = ?4
             WHERE id = ?1",
            params![
                source_id,
                window_count as i64,
                character_count as i64,
                index_path
            ],
        )?;
        Ok(())
    }

    pub fn set_source_failed(&self, source_id: i64, reason: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sources SET state = 'failed', failure_reason = ?2 WHERE id = ?1",
            params![source_id, reason],
        )?;
        Ok(())
    }

    pub fn get_source(&self, source_id: i64) -> Result<Option<Source>> {
        self.conn
            .query_row(
                "SELECT id, title, author, format, state, failure_reason,
                        window_count, character_count, index_path
                 FROM sources WHERE id = ?1",
                params![source_id],
                |row| {
                    Ok(Source {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        author: row.get(2)?,
                        format: row.get(3)?,
                        state: SourceState::from_str(&row.get::<_, String>(4)?),
                        failure_reason: row.get(5)?,
                        window_count: row.get(6)?,
                        character_count: row.get(7)?,
                        index_path: row.get(8)?,
                    })
                },
            )
            .optional()
            .map_err(StoryMindError::from)
    }

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, author, format, state, failure_reason,
                    window_count, character_count, index_path
             FROM sources ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Source {
                id: row.get(0)?,
                title: row.get(1)?,
                author: row.get(2)?,
                format: row.get(3)?,
                state: SourceState::from_str(&row.get::<_, String>(4)?),
                failure_reason: row.get(5)?,
                window_count: row.get(6)?,
                character_count: row.get(7)?,
                index_path: row.get(8)?,
            })
        })?;
        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    pub fn insert_character(
        &self,
        source_id: i64,
        name: &str,
        description: &str,
        mention_count: usize,
        seed: u32,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO characters (source_id, name, description, mention_count, seed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![source_id, name, description, mention_count as i64, seed],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_character(&self, character_id: i64) -> Result<Option<CharacterRow>> {
        self.conn
            .query_row(
                "SELECT id, source_id, name, description, mention_count, seed
                 FROM characters WHERE id = ?1",
                params![character_id],
                |row| {
                    Ok(CharacterRow {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        mention_count: row.get(4)?,
                        seed: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(StoryMindError::from)
    }

    pub fn list_characters(&self, source_id: i64) -> Result<Vec<CharacterRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, name, description, mention_count, seed
             FROM characters WHERE source_id = ?1 ORDER BY mention_count DESC, name ASC",
        )?;
        let rows = stmt.query_map(params![source_id], |row| {
            Ok(CharacterRow {
                id: row.get(0)?,
                source_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                mention_count: row.get(4)?,
                seed: row.get(5)?,
            })
        })?;
        let mut characters = Vec::new();
        for row in rows {
            characters.push(row?);
        }
        Ok(characters)
    }

    pub fn insert_image(
        &self,
        character_id: i64,
        path: &str,
        prompt: &str,
        style: &str,
        aspect_ratio: &str,
        outcome: &str,
        duration_ms: u64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO images (character_id, path, prompt, style, aspect_ratio, outcome, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![character_id, path, prompt, style, aspect_ratio, outcome, duration_ms as i64],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn current_image(&self, character_id: i64) -> Result<Option<ImageRow>> {
        self.conn
            .query_row(
                "SELECT id, character_id, path, prompt, style, aspect_ratio, outcome, duration_ms
                 FROM images WHERE character_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![character_id],
                |row| {
                    Ok(ImageRow {
                        id: row.get(0)?,
                        character_id: row.get(1)?,
                        path: row.get(2)?,
                        prompt: row.get(3)?,
                        style: row.get(4)?,
                        aspect_ratio: row.get(5)?,
                        outcome: row.get(6)?,
                        duration_ms: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(StoryMindError::from)
    }

    /// Delete a source and, via cascading foreign keys, its characters and
    /// their images. Returns the index path so the caller can remove the
    /// on-disk index file (filesystem deletions happen outside the
    /// transaction and are best-effort).
    pub fn delete_source(&self, source_id: i64) -> Result<Option<String>> {
        let index_path: Option<String> = self
            .conn
            .query_row(
                "SELECT index_path FROM sources WHERE id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        self.conn
            .execute("DELETE FROM sources WHERE id = ?1", params![source_id])?;
        Ok(index_path)
    }

    /// All current image paths under a source, for best-effort filesystem
    /// cleanup before the cascading database delete.
    pub fn image_paths_for_source(&self, source_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT images.path FROM images
             JOIN characters ON images.character_id = characters.id
             WHERE characters.source_id = ?1",
        )?;
        let rows = stmt.query_map(params![source_id], |row| row.get::<_, String>(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_pending_source_inserts_new_row() {
        let db = DB::in_memory().unwrap();
        let id = db
            .upsert_pending_source("Harry Potter", Some("J.K. Rowling"), "epub")
            .unwrap();
        let source = db.get_source(id).unwrap().unwrap();
        assert_eq!(source.title, "Harry Potter");
        assert_eq!(source.state, SourceState::Pending);
    }

    #[test]
    fn upsert_pending_source_supersedes_normalized_duplicate() {
        let db = DB::in_memory().unwrap();
        let first_id = db.upsert_pending_source("Dracula", None, "pdf").unwrap();
        db.set_source_completed(first_id, 500, 3, "/tmp/dracula.idx")
            .unwrap();

        let second_id = db.upsert_pending_source("  dracula  ", None, "pdf").unwrap();
        assert_ne!(first_id, second_id);
        assert!(db.get_source(first_id).unwrap().is_none());

        let sources = db.list_sources().unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn deleting_source_cascades_to_characters_and_images() {
        let db = DB::in_memory().unwrap();
        let source_id = db.upsert_pending_source("Emma", None, "txt").unwrap();
        let char_id = db
            .insert_character(source_id, "Emma Woodhouse", "A description.", 12, 42)
            .unwrap();
        db.insert_image(
            char_id,
            "/tmp/emma-woodhouse_42.png",
            "a prompt",
            "photorealistic",
            "1:1",
            "real",
            1200,
        )
        .unwrap();

        db.delete_source(source_id).unwrap();

        assert!(db.get_source(source_id).unwrap().is_none());
        assert!(db.get_character(char_id).unwrap().is_none());
        assert!(db.current_image(char_id).unwrap().is_none());
    }

    #[test]
    fn character_name_unique_per_source() {
        let db = DB::in_memory().unwrap();
        let source_id = db.upsert_pending_source("Emma", None, "txt").unwrap();
        db.insert_character(source_id, "Emma Woodhouse", "desc", 1, 1)
            .unwrap();
        let err = db
            .insert_character(source_id, "Emma Woodhouse", "desc", 1, 1)
            .unwrap_err();
        assert!(matches!(err, StoryMindError::PersistenceError(_)));
    }

    #[test]
    fn current_image_returns_most_recent() {
        let db = DB::in_memory().unwrap();
        let source_id = db.upsert_pending_source("Emma", None, "txt").unwrap();
        let char_id = db
            .insert_character(source_id, "Emma Woodhouse", "desc", 1, 1)
            .unwrap();
        db.insert_image(char_id, "/tmp/first.png", "p", "s", "1:1", "placeholder", 10)
            .unwrap();
        db.insert_image(char_id, "/tmp/second.png", "p", "s", "1:1", "real", 900)
            .unwrap();

        let current = db.current_image(char_id).unwrap().unwrap();
        assert_eq!(current.path, "/tmp/second.png");
    }
}
