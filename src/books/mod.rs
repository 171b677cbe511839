//! Book catalog: records, validation and SQLite storage.

pub mod error;
pub mod model;
pub mod store;

pub use error::BookError;
pub use model::{
    Book, BookPatch, BookPatchRequest, Category, CategoryEntry, NewBook, NewBookForm,
    COVER_URL_PREFIX, DEFAULT_SYNOPSIS,
};
pub use store::{BookOrder, BookStore};
