//! Catalog records and the validation applied before they reach the store.
//!
//! Wire names follow the catalog's public JSON (`titulo`, `autor`,
//! `categoria`, `capa`, `sinopse`); Rust names are English.

use super::error::BookError;
use crate::util::{push_field_error, FieldErrors, MSG_BLANK, MSG_NULL};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Longest accepted title.
pub const MAX_TITLE_LEN: usize = 100;

/// Longest accepted author name.
pub const MAX_AUTHOR_LEN: usize = 100;

/// Synopsis stored when none is given.
pub const DEFAULT_SYNOPSIS: &str = "Sinopse..";

/// Public path prefix under which covers are served.
pub const COVER_URL_PREFIX: &str = "/capas/";

/// Book genre, stored and transmitted as a one-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    SelfHelp,
    Biography,
    Comedy,
    Epic,
    Children,
    Literature,
    Mathematics,
    Poetry,
    Romance,
    Horror,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Self::SelfHelp,
        Self::Biography,
        Self::Comedy,
        Self::Epic,
        Self::Children,
        Self::Literature,
        Self::Mathematics,
        Self::Poetry,
        Self::Romance,
        Self::Horror,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::SelfHelp => "A",
            Self::Biography => "B",
            Self::Comedy => "C",
            Self::Epic => "E",
            Self::Children => "I",
            Self::Literature => "L",
            Self::Mathematics => "M",
            Self::Poetry => "P",
            Self::Romance => "R",
            Self::Horror => "T",
        }
    }

    /// Display name shown to readers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SelfHelp => "Autoajuda",
            Self::Biography => "Bibliografia",
            Self::Comedy => "Comedia",
            Self::Epic => "Epico",
            Self::Children => "Infantil",
            Self::Literature => "Literatura",
            Self::Mathematics => "Matematica",
            Self::Poetry => "Poesia",
            Self::Romance => "Romance",
            Self::Horror => "Terror",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_str()?;
        Category::from_code(code)
            .ok_or_else(|| FromSqlError::Other(format!("unknown category code {code:?}").into()))
    }
}

/// Entry in the category listing.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryEntry {
    #[serde(rename = "codigo")]
    pub code: &'static str,
    #[serde(rename = "nome")]
    pub name: &'static str,
}

impl From<Category> for CategoryEntry {
    fn from(category: Category) -> Self {
        Self {
            code: category.code(),
            name: category.label(),
        }
    }
}

/// A stored book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub id: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "autor")]
    pub author: String,
    #[serde(rename = "categoria")]
    pub category: Category,
    /// Cover file name inside the covers directory.
    #[serde(rename = "capa", serialize_with = "serialize_cover")]
    pub cover: Option<String>,
    #[serde(rename = "sinopse")]
    pub synopsis: String,
}

fn serialize_cover<S: Serializer>(cover: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match cover {
        Some(name) => serializer.serialize_str(&format!("{COVER_URL_PREFIX}{name}")),
        None => serializer.serialize_none(),
    }
}

/// Validated fields of a book to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub category: Category,
    pub cover: Option<String>,
    pub synopsis: String,
}

/// Validated partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<Category>,
    pub synopsis: Option<String>,
    /// Replacement cover file name.
    pub cover: Option<String>,
}

impl BookPatch {
    pub fn apply(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title.clone_from(title);
        }
        if let Some(author) = &self.author {
            book.author.clone_from(author);
        }
        if let Some(category) = self.category {
            book.category = category;
        }
        if let Some(synopsis) = &self.synopsis {
            book.synopsis.clone_from(synopsis);
        }
        if let Some(cover) = &self.cover {
            book.cover = Some(cover.clone());
        }
    }
}

/// Raw text fields of a create request (multipart form).
#[derive(Debug, Clone, Default)]
pub struct NewBookForm {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub synopsis: Option<String>,
}

impl NewBookForm {
    /// Check the form; `cover` is the already-stored cover file, if any.
    ///
    /// A missing or empty title, author or category is reported as
    /// [`BookError::Incomplete`] before any field is inspected further.
    pub fn validate(self, cover: Option<String>) -> Result<NewBook, BookError> {
        let (Some(title), Some(author), Some(category)) = (
            non_empty(self.title),
            non_empty(self.author),
            non_empty(self.category),
        ) else {
            return Err(BookError::Incomplete);
        };

        let mut errors = FieldErrors::new();
        check_len(&mut errors, "titulo", &title, MAX_TITLE_LEN);
        check_len(&mut errors, "autor", &author, MAX_AUTHOR_LEN);
        let category = match parse_category(&mut errors, &category) {
            Some(category) if errors.is_empty() => category,
            _ => return Err(BookError::Invalid(errors)),
        };

        Ok(NewBook {
            title,
            author,
            category,
            cover,
            synopsis: self
                .synopsis
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| DEFAULT_SYNOPSIS.to_string()),
        })
    }
}

/// JSON body of a partial update.
///
/// Each field is `None` when absent and `Some(None)` when sent as `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookPatchRequest {
    #[serde(rename = "titulo", default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(rename = "autor", default, deserialize_with = "present")]
    pub author: Option<Option<String>>,
    #[serde(rename = "categoria", default, deserialize_with = "present")]
    pub category: Option<Option<String>>,
    #[serde(rename = "sinopse", default, deserialize_with = "present")]
    pub synopsis: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl BookPatchRequest {
    pub fn validate(self) -> Result<BookPatch, BookError> {
        let mut errors = FieldErrors::new();
        let mut patch = BookPatch::default();

        if let Some(title) = required(&mut errors, "titulo", self.title) {
            check_len(&mut errors, "titulo", &title, MAX_TITLE_LEN);
            patch.title = Some(title);
        }
        if let Some(author) = required(&mut errors, "autor", self.author) {
            check_len(&mut errors, "autor", &author, MAX_AUTHOR_LEN);
            patch.author = Some(author);
        }
        if let Some(code) = required(&mut errors, "categoria", self.category) {
            patch.category = parse_category(&mut errors, &code);
        }
        match self.synopsis {
            Some(Some(synopsis)) => patch.synopsis = Some(synopsis.trim().to_string()),
            Some(None) => push_field_error(&mut errors, "sinopse", MSG_NULL),
            None => {}
        }

        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(BookError::Invalid(errors))
        }
    }
}

/// Trimmed value, or `None` when absent or blank.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A present field must be non-null and non-blank. Returns it trimmed.
fn required(errors: &mut FieldErrors, field: &str, value: Option<Option<String>>) -> Option<String> {
    match value? {
        None => {
            push_field_error(errors, field, MSG_NULL);
            None
        }
        Some(v) if v.trim().is_empty() => {
            push_field_error(errors, field, MSG_BLANK);
            None
        }
        Some(v) => Some(v.trim().to_string()),
    }
}

fn check_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        push_field_error(
            errors,
            field,
            format!("Certifique-se de que este campo não tenha mais de {max} caracteres."),
        );
    }
}

fn parse_category(errors: &mut FieldErrors, code: &str) -> Option<Category> {
    let category = Category::from_code(code.trim());
    if category.is_none() {
        push_field_error(
            errors,
            "categoria",
            format!("\"{code}\" não é uma escolha válida."),
        );
    }
    category
}
