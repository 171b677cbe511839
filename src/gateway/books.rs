//! Catalog handlers: `/livros/*` and `/capas/{file}`.

use super::auth::bad_json;
use super::{AppState, INTERNAL_ERROR_MSG};
use crate::books::{
    Book, BookError, BookOrder, BookPatchRequest, Category, CategoryEntry, NewBookForm,
};
use crate::util::{push_field_error, FieldErrors};
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        FromRequest, Path, Query, Request, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use image::ImageReader;
use mime_guess::mime;
use serde::Deserialize;
use std::io::Cursor;
use std::path::PathBuf;
use uuid::Uuid;

const MSG_CREATED: &str = "Livro criado com sucesso!";
const MSG_NOT_IMAGE: &str =
    "Envie uma imagem válida. O arquivo enviado não é uma imagem ou está corrompido.";

/// Query string of the listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    ordem: Option<BookOrder>,
}

/// An uploaded cover whose bytes decode as an image.
struct CoverImage {
    /// Stored name: a fresh UUID with the extension of the detected format.
    file_name: String,
    data: Bytes,
}

impl CoverImage {
    /// `None` unless the bytes are a complete image in a format this server decodes.
    fn decode(data: Bytes) -> Option<Self> {
        let reader = ImageReader::new(Cursor::new(&data[..]))
            .with_guessed_format()
            .ok()?;
        let format = reader.format()?;
        reader.decode().ok()?;
        let ext = format.extensions_str().first()?;
        Some(Self {
            file_name: format!("{}.{ext}", Uuid::new_v4()),
            data,
        })
    }
}

enum CoverCheck {
    Absent,
    Rejected,
    Accepted(CoverImage),
}

impl CoverCheck {
    fn file_name(&self) -> Option<String> {
        match self {
            Self::Accepted(image) => Some(image.file_name.clone()),
            _ => None,
        }
    }
}

async fn check_cover(upload: Option<Bytes>) -> anyhow::Result<CoverCheck> {
    let Some(data) = upload else {
        return Ok(CoverCheck::Absent);
    };
    let decoded = tokio::task::spawn_blocking(move || CoverImage::decode(data)).await?;
    Ok(decoded.map_or(CoverCheck::Rejected, CoverCheck::Accepted))
}

/// Fold a rejected cover into the outcome of the text-field check.
///
/// Incomplete data is reported alone; field errors gain a `capa` entry.
fn reject_cover<T>(checked: Result<T, BookError>) -> BookError {
    let mut errors = match checked {
        Ok(_) => FieldErrors::new(),
        Err(BookError::Invalid(errors)) => errors,
        Err(e) => return e,
    };
    push_field_error(&mut errors, "capa", MSG_NOT_IMAGE);
    BookError::Invalid(errors)
}

async fn write_cover(state: &AppState, image: &CoverImage) -> Result<PathBuf, BookError> {
    let path = state.covers_dir.join(&image.file_name);
    tokio::fs::write(&path, &image.data)
        .await
        .with_context(|| format!("Failed to write cover {}", path.display()))?;
    Ok(path)
}

async fn remove_cover(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove cover {}: {e}", path.display());
    }
}

fn book_failure(err: BookError) -> Response {
    match err {
        BookError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"msg": format!("Livro com id #{id} não existe")})),
        )
            .into_response(),
        BookError::Incomplete => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Dados incompletos."})),
        )
            .into_response(),
        BookError::Invalid(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
        BookError::Storage(e) => {
            tracing::error!("Catalog request failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": INTERNAL_ERROR_MSG})),
            )
                .into_response()
        }
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

/// GET /livros/lista?ordem=titulo|id
pub async fn handle_list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let order = match query {
        Ok(Query(q)) => q.ordem.unwrap_or_default(),
        Err(e) => return bad_request(format!("Parâmetro inválido: {}", e.body_text())),
    };
    match state.books.list(order) {
        Ok(books) => Json(books).into_response(),
        Err(e) => book_failure(e.into()),
    }
}

/// DELETE /livros/lista: body is a JSON array of ids.
pub async fn handle_delete_many(
    State(state): State<AppState>,
    body: Result<Json<Vec<i64>>, JsonRejection>,
) -> Response {
    let ids = match body {
        Ok(Json(ids)) => ids,
        Err(e) => return bad_json(&e).into_response(),
    };

    let missing = match state.books.delete_many(&ids) {
        Ok(missing) => missing,
        Err(e) => return book_failure(e.into()),
    };
    tracing::info!(
        requested = ids.len(),
        missing = missing.len(),
        "Books deleted"
    );

    if missing.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let listed = missing
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": format!("Os seguintes itens não foram encontrados: [{listed}]")
        })),
    )
        .into_response()
}

async fn read_book_form(
    mut multipart: Multipart,
) -> Result<(NewBookForm, Option<Bytes>), MultipartError> {
    let mut form = NewBookForm::default();
    let mut cover = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "titulo" => form.title = Some(field.text().await?),
            "autor" => form.author = Some(field.text().await?),
            "categoria" => form.category = Some(field.text().await?),
            "sinopse" => form.synopsis = Some(field.text().await?),
            "capa" => {
                let data = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !data.is_empty() {
                    cover = Some(data);
                }
            }
            _ => {}
        }
    }

    Ok((form, cover))
}

/// POST /livros/livro: multipart create with optional cover image.
pub async fn handle_create(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(m) => m,
        Err(e) => return bad_request(format!("Requisição inválida: {}", e.body_text())),
    };
    let (form, upload) = match read_book_form(multipart).await {
        Ok(parts) => parts,
        Err(e) => return bad_request(format!("Requisição inválida: {}", e.body_text())),
    };

    let cover = match check_cover(upload).await {
        Ok(cover) => cover,
        Err(e) => return book_failure(e.into()),
    };
    let new_book = match (form.validate(cover.file_name()), &cover) {
        (checked, CoverCheck::Rejected) => return book_failure(reject_cover(checked)),
        (Ok(book), _) => book,
        (Err(e), _) => return book_failure(e),
    };

    let cover_path = match &cover {
        CoverCheck::Accepted(image) => match write_cover(&state, image).await {
            Ok(path) => Some(path),
            Err(e) => return book_failure(e),
        },
        _ => None,
    };

    match state.books.insert(&new_book) {
        Ok(book) => {
            tracing::info!(book_id = book.id, cover = ?book.cover, "Book created");
            (
                StatusCode::CREATED,
                Json(serde_json::json!({"message": MSG_CREATED, "livro": book})),
            )
                .into_response()
        }
        Err(e) => {
            if let Some(path) = cover_path {
                remove_cover(&path).await;
            }
            book_failure(e.into())
        }
    }
}

/// GET /livros/livro/{id}
pub async fn handle_get(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.books.get(id) {
        Ok(Some(book)) => Json(book).into_response(),
        Ok(None) => book_failure(BookError::NotFound(id)),
        Err(e) => book_failure(e.into()),
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
}

/// Body of an update: JSON, or a multipart form that may carry a new cover.
async fn read_update(
    request: Request,
    state: &AppState,
) -> Result<(BookPatchRequest, Option<Bytes>), Response> {
    if !is_multipart(&request) {
        return match Json::<BookPatchRequest>::from_request(request, state).await {
            Ok(Json(body)) => Ok((body, None)),
            Err(e) => Err(bad_json(&e).into_response()),
        };
    }

    let multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| bad_request(format!("Requisição inválida: {}", e.body_text())))?;
    let (form, cover) = read_book_form(multipart)
        .await
        .map_err(|e| bad_request(format!("Requisição inválida: {}", e.body_text())))?;
    let body = BookPatchRequest {
        title: form.title.map(Some),
        author: form.author.map(Some),
        category: form.category.map(Some),
        synopsis: form.synopsis.map(Some),
    };
    Ok((body, cover))
}

/// PUT /livros/livro/{id}: partial update, optionally replacing the cover.
pub async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Request,
) -> Response {
    let current = match state.books.get(id) {
        Ok(Some(book)) => book,
        Ok(None) => return book_failure(BookError::NotFound(id)),
        Err(e) => return book_failure(e.into()),
    };

    let (body, upload) = match read_update(request, &state).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let cover = match check_cover(upload).await {
        Ok(cover) => cover,
        Err(e) => return book_failure(e.into()),
    };
    let mut patch = match (body.validate(), &cover) {
        (checked, CoverCheck::Rejected) => return book_failure(reject_cover(checked)),
        (Ok(patch), _) => patch,
        (Err(e), _) => return book_failure(e),
    };

    let cover_path = match &cover {
        CoverCheck::Accepted(image) => match write_cover(&state, image).await {
            Ok(path) => {
                patch.cover = Some(image.file_name.clone());
                Some(path)
            }
            Err(e) => return book_failure(e),
        },
        _ => None,
    };

    let updated = match state.books.update(id, &patch) {
        Ok(Some(book)) => book,
        outcome => {
            if let Some(path) = &cover_path {
                remove_cover(path).await;
            }
            return match outcome {
                Ok(_) => book_failure(BookError::NotFound(id)),
                Err(e) => book_failure(e.into()),
            };
        }
    };

    if cover_path.is_some() {
        if let Some(old) = current.cover.as_deref().filter(|name| is_plain_file_name(name)) {
            remove_cover(&state.covers_dir.join(old)).await;
        }
    }
    tracing::info!(book_id = id, cover = ?updated.cover, "Book updated");
    Json::<Book>(updated).into_response()
}

/// GET /livros/categorias
pub async fn handle_categories() -> Json<Vec<CategoryEntry>> {
    Json(Category::ALL.into_iter().map(CategoryEntry::from).collect())
}

/// A bare file name: no separators, no parent references, no hidden files.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(&['/', '\\'][..])
        && std::path::Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

/// GET /capas/{file}
pub async fn handle_cover(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Arquivo não encontrado."})),
        )
            .into_response()
    };
    if !is_plain_file_name(&file) {
        return not_found();
    }

    match tokio::fs::read(state.covers_dir.join(&file)).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(&file).first_or_octet_stream();
            ([(header::CONTENT_TYPE, content_type.to_string())], bytes).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(e) => book_failure(anyhow::Error::new(e).context("Failed to read cover").into()),
    }
}
