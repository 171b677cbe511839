//! VersoLivro: book catalog API with token authentication.

pub mod auth;
pub mod books;
pub mod config;
pub mod gateway;
pub mod util;

pub use config::Config;
