pub mod filters;
pub mod providers;
pub mod support;
pub mod trailer;

pub use filters::{genre_names, MovieFilter};
pub use providers::{CatalogProvider, TmdbProvider};
pub use support::submit_support_message;
pub use trailer::find_trailer;
