pub mod catalog;

pub use catalog::{fetch_movies_batch, CatalogApi, HttpCatalog};
