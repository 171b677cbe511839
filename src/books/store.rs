//! SQLite-backed book catalog.
//!
//! Table:
//! - `books`: id, title, author, category (one-letter code), cover, synopsis

use super::model::{Book, BookPatch, NewBook};
use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Deserialize;
use std::path::Path;

/// Sort order of the catalog listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum BookOrder {
    #[default]
    #[serde(rename = "titulo")]
    Title,
    #[serde(rename = "id")]
    Id,
}

impl BookOrder {
    fn order_by(self) -> &'static str {
        match self {
            Self::Title => "title, id",
            Self::Id => "id",
        }
    }
}

const BOOK_COLUMNS: &str = "id, title, author, category, cover, synopsis";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        category: row.get(3)?,
        cover: row.get(4)?,
        synopsis: row.get(5)?,
    })
}

/// SQLite-backed book store.
pub struct BookStore {
    conn: Mutex<Connection>,
}

impl BookStore {
    /// Open (or create) the catalog table in the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                category TEXT NOT NULL,
                cover TEXT,
                synopsis TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All books in the requested order.
    pub fn list(&self, order: BookOrder) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY {}",
            order.order_by()
        ))?;
        let books = stmt
            .query_map([], book_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    pub fn get(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        let book = conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                params![id],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    pub fn insert(&self, new: &NewBook) -> Result<Book> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (title, author, category, cover, synopsis)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![new.title, new.author, new.category, new.cover, new.synopsis],
        )?;
        Ok(Book {
            id: conn.last_insert_rowid(),
            title: new.title.clone(),
            author: new.author.clone(),
            category: new.category,
            cover: new.cover.clone(),
            synopsis: new.synopsis.clone(),
        })
    }

    /// Apply a partial update. Returns `None` if the book does not exist.
    pub fn update(&self, id: i64, patch: &BookPatch) -> Result<Option<Book>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut book) = tx
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                params![id],
                book_from_row,
            )
            .optional()?
        else {
            return Ok(None);
        };

        patch.apply(&mut book);
        tx.execute(
            "UPDATE books SET title = ?1, author = ?2, category = ?3, synopsis = ?4, cover = ?5
             WHERE id = ?6",
            params![book.title, book.author, book.category, book.synopsis, book.cover, id],
        )?;

        tx.commit()?;
        Ok(Some(book))
    }

    /// Delete every listed book that exists.
    ///
    /// Returns the ids that were not found, in request order.
    pub fn delete_many(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut missing = Vec::new();
        for &id in ids {
            let deleted = tx.execute("DELETE FROM books WHERE id = ?1", params![id])?;
            if deleted == 0 {
                missing.push(id);
            }
        }

        tx.commit()?;
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::model::{Category, DEFAULT_SYNOPSIS};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, BookStore) {
        let tmp = TempDir::new().unwrap();
        let store = BookStore::open(&tmp.path().join("books.db")).unwrap();
        (tmp, store)
    }

    fn new_book(title: &str, category: Category) -> NewBook {
        NewBook {
            title: title.into(),
            author: "Autor".into(),
            category,
            cover: None,
            synopsis: DEFAULT_SYNOPSIS.into(),
        }
    }

    #[test]
    fn insert_and_get() {
        let (_tmp, store) = test_store();

        let book = store.insert(&new_book("Vidas Secas", Category::Literature)).unwrap();
        assert_eq!(store.get(book.id).unwrap().unwrap(), book);
        assert!(store.get(book.id + 1).unwrap().is_none());
    }

    #[test]
    fn list_orders_by_title_or_id() {
        let (_tmp, store) = test_store();
        let c = store.insert(&new_book("Capitães da Areia", Category::Romance)).unwrap();
        let a = store.insert(&new_book("A Hora da Estrela", Category::Literature)).unwrap();
        let b = store.insert(&new_book("Bom Crioulo", Category::Romance)).unwrap();

        let by_title: Vec<i64> = store
            .list(BookOrder::Title)
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(by_title, vec![a.id, b.id, c.id]);

        let by_id: Vec<i64> = store.list(BookOrder::Id).unwrap().iter().map(|b| b.id).collect();
        assert_eq!(by_id, vec![c.id, a.id, b.id]);
    }

    #[test]
    fn update_applies_patch() {
        let (_tmp, store) = test_store();
        let book = store.insert(&new_book("Rascunho", Category::Epic)).unwrap();

        let patch = BookPatch {
            title: Some("Os Lusíadas".into()),
            ..BookPatch::default()
        };
        let updated = store.update(book.id, &patch).unwrap().unwrap();

        assert_eq!(updated.title, "Os Lusíadas");
        assert_eq!(updated.category, Category::Epic);
        assert_eq!(store.get(book.id).unwrap().unwrap(), updated);
        assert!(store.update(999, &patch).unwrap().is_none());
    }

    #[test]
    fn update_replaces_cover_only_when_given() {
        let (_tmp, store) = test_store();
        let mut new = new_book("Macunaíma", Category::Romance);
        new.cover = Some("antiga.png".into());
        let book = store.insert(&new).unwrap();

        let retitled = BookPatch {
            title: Some("Macunaíma, o herói".into()),
            ..BookPatch::default()
        };
        let updated = store.update(book.id, &retitled).unwrap().unwrap();
        assert_eq!(updated.cover.as_deref(), Some("antiga.png"));

        let recovered = BookPatch {
            cover: Some("nova.jpg".into()),
            ..BookPatch::default()
        };
        store.update(book.id, &recovered).unwrap();
        let stored = store.get(book.id).unwrap().unwrap();
        assert_eq!(stored.cover.as_deref(), Some("nova.jpg"));
        assert_eq!(stored.title, "Macunaíma, o herói");
    }

    #[test]
    fn delete_many_reports_missing_ids() {
        let (_tmp, store) = test_store();
        let a = store.insert(&new_book("Um", Category::Poetry)).unwrap();
        let b = store.insert(&new_book("Dois", Category::Poetry)).unwrap();

        let missing = store.delete_many(&[a.id, 404, b.id, 405]).unwrap();

        assert_eq!(missing, vec![404, 405]);
        assert!(store.list(BookOrder::Id).unwrap().is_empty());
    }

    #[test]
    fn order_parses_from_query_values() {
        let order: BookOrder = serde_json::from_str(r#""id""#).unwrap();
        assert_eq!(order, BookOrder::Id);
        let order: BookOrder = serde_json::from_str(r#""titulo""#).unwrap();
        assert_eq!(order, BookOrder::Title);
        assert_eq!(BookOrder::default(), BookOrder::Title);
    }
}
