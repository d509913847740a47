//! Collaborators that locate and retrieve source documents.

pub mod extract;
pub mod fetch;
pub mod metadata;

pub use extract::extract_pages;
pub use fetch::{DocumentFetcher, FetchError, FetchedDocument, HttpDocumentFetcher, ScratchFile};
pub use metadata::{DocumentRecord, MetadataError, MetadataStore, PgMetadataStore};
