//! Repository layer: all SQL lives here.
//!
//! Backed by libsql in local mode. Connections are opened with WAL
//! journaling, a 5 s busy timeout, `synchronous=NORMAL`, and foreign keys
//! on, so HTTP readers and the single pipeline writer coexist. Every
//! caller gets a scoped [`Storage`] handle (one per API request, one per
//! background job) and closes it when done.

mod content;
mod embeddings;
mod rows;
mod schema;
mod sources;

use std::path::{Path, PathBuf};

use libsql::{Builder, Connection};

use prismis_core::{Error, Result};

pub use embeddings::EMBEDDING_DIM;

pub struct Storage {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: Connection,
    path: PathBuf,
}

impl Storage {
    /// Open (and, on first use, initialize) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("cannot create {}: {e}", parent.display())))?;
        }

        let db = Builder::new_local(&path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("cannot open {}: {e}", path.display())))?;
        let conn = db.connect().map_err(Error::storage)?;

        apply_pragmas(&conn).await?;
        ensure_schema(&conn).await?;

        Ok(Self { db, conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Release the underlying connection. Dropping has the same effect;
    /// this exists so scoped-acquisition call sites can be explicit.
    pub fn close(self) {}
}

async fn apply_pragmas(conn: &Connection) -> Result<()> {
    // PRAGMA statements can return rows; drain them before continuing.
    for pragma in [
        "PRAGMA journal_mode=WAL",
        "PRAGMA busy_timeout=5000",
        "PRAGMA synchronous=NORMAL",
        "PRAGMA foreign_keys=ON",
    ] {
        let mut rows = conn.query(pragma, ()).await.map_err(Error::storage)?;
        while rows.next().await.map_err(Error::storage)?.is_some() {}
    }
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    for statement in schema::ALL_STATEMENTS {
        conn.execute(statement, ()).await.map_err(Error::storage)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A Storage over a throwaway database file. The TempDir must outlive
    /// the handle.
    pub async fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::open(dir.path().join("test.db"))
            .await
            .expect("open storage");
        (dir, storage)
    }
}
