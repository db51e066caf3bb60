//! # sarc-archive — Allow-listed Keyed Archiving
//!
//! Encodes graphs of application objects into binary keyed archives and
//! decodes them back, instantiating only the types a [`TypeRegistry`]
//! admits.
//!
//! - **Object model** ([`object`]): an [`ObjectGraph`] arena of boxed
//!   [`Archivable`] values. Shared references and cycles are expressed by
//!   repeating an [`ObjectId`].
//! - **Registry** ([`registry`]): type name to factory. Names that are not
//!   registered fail decoding with [`ArchiveError::DisallowedType`].
//! - **Encoder** ([`encoder`]) and **decoder** ([`decoder`]).
//! - **Extractor** ([`extract`]): reads the root reference of an archive
//!   without decoding it.
//!
//! ```ignore
//! let bytes = sarc_archive::archive(&graph)?;
//! let decoded = sarc_archive::unarchive(&bytes, standard_registry())?;
//! assert_eq!(sarc_archive::extract_root_uid(&bytes), Some(Uid::new(1)));
//! ```
//!
//! ## Crate Policy
//!
//! - Decoding is total: every input yields a graph or a classified error.
//! - Partially decoded graphs are never returned.
//! - No `unsafe` code.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod extract;
pub mod json;
pub mod object;
pub mod registry;
pub mod types;

pub use config::{ArchiveConfig, ArchiveLimits, ConfigError};
pub use decoder::Unarchiver;
pub use encoder::Archiver;
pub use extract::{extract_root_uid, extract_top_uid, is_keyed_archive};
pub use object::{Archivable, FieldWriter, ObjectGraph, ObjectId, Value};
pub use registry::{standard_registry, TypeRegistry, TypeRegistryBuilder};
pub use types::{NsArray, NsDate, NsDictionary, NsMutableData, NsMutableString, NsSet, NsUrl};

pub use sarc_core::{ArchiveError, ErrorKind, FieldError, FramingError, Uid};

/// Encode `graph` with default limits.
pub fn archive(graph: &ObjectGraph) -> Result<Vec<u8>, ArchiveError> {
    Archiver::new().archive(graph)
}

/// Decode `data`, admitting only the types in `registry`.
pub fn unarchive(data: &[u8], registry: &TypeRegistry) -> Result<ObjectGraph, ArchiveError> {
    Unarchiver::new(registry).unarchive(data)
}

/// Decode `data`, returning `None` on any failure. The failure is logged.
pub fn unarchive_opt(data: &[u8], registry: &TypeRegistry) -> Option<ObjectGraph> {
    Unarchiver::new(registry).unarchive_opt(data)
}
