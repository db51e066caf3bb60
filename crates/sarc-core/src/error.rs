//! # Error Hierarchy
//!
//! Structured error types for keyed archiving, built with `thiserror`.
//! No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! Every failure is terminal for the call that produced it. The variants are
//! kept distinct because they indicate different threats:
//!
//! - [`ArchiveError::DisallowedType`] means the payload asked for a type the
//!   allow-list does not permit. Treat as a potentially hostile input.
//! - [`ArchiveError::MalformedFraming`], [`ArchiveError::OutOfRangeReference`]
//!   and [`ArchiveError::FieldPopulation`] mean the bytes are damaged or were
//!   not produced by a conforming archiver.
//! - [`ArchiveError::UnsupportedEncodeType`] is a caller bug on the encode path.
//! - [`ArchiveError::LimitExceeded`] means a configured resource bound tripped.

use std::fmt;

use thiserror::Error;

/// Top-level error type for archiving operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Truncated or garbled byte-level structure, or a keyed-archive layout
    /// that does not match the expected shape.
    #[error("malformed archive framing: {0}")]
    MalformedFraming(#[from] FramingError),

    /// A reference index points past the end of the object table.
    #[error("reference {uid} is out of range for an object table of {table_len} entries")]
    OutOfRangeReference {
        /// The offending reference index.
        uid: u64,
        /// Number of entries in the object table.
        table_len: usize,
    },

    /// The archive names a type that is not in the allow-list.
    #[error("disallowed type \"{class_name}\": not present in the type registry")]
    DisallowedType {
        /// The archived type name.
        class_name: String,
    },

    /// The encoder was handed an object it cannot introspect.
    #[error("unsupported type \"{type_name}\" for encoding: {reason}")]
    UnsupportedEncodeType {
        /// Type name reported by the object.
        type_name: String,
        /// Why the object was rejected.
        reason: String,
    },

    /// A decoded value could not be stored into the target field.
    #[error("failed to populate field \"{key}\" of \"{class_name}\": {source}")]
    FieldPopulation {
        /// Type being populated.
        class_name: String,
        /// Field key that was rejected.
        key: String,
        /// Underlying coercion failure.
        #[source]
        source: FieldError,
    },

    /// A configured resource bound was exceeded.
    #[error("archive limit exceeded: {limit} (max {max})")]
    LimitExceeded {
        /// Name of the limit that tripped.
        limit: &'static str,
        /// Configured maximum.
        max: u64,
    },
}

impl ArchiveError {
    /// Classification of this error for logging and telemetry.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedFraming(_) => ErrorKind::MalformedFraming,
            Self::OutOfRangeReference { .. } => ErrorKind::OutOfRangeReference,
            Self::DisallowedType { .. } => ErrorKind::DisallowedType,
            Self::UnsupportedEncodeType { .. } => ErrorKind::UnsupportedEncodeType,
            Self::FieldPopulation { .. } => ErrorKind::FieldPopulation,
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
        }
    }

    /// True when the input asked for something the allow-list forbids.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::DisallowedType { .. })
    }

    /// True when the input bytes are damaged or non-conforming.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::MalformedFraming(_) | Self::OutOfRangeReference { .. } | Self::FieldPopulation { .. }
        )
    }

    pub(crate) fn limit(limit: &'static str, max: impl TryInto<u64>) -> Self {
        Self::LimitExceeded {
            limit,
            max: max.try_into().unwrap_or(u64::MAX),
        }
    }
}

/// Flat classification of [`ArchiveError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedFraming,
    OutOfRangeReference,
    DisallowedType,
    UnsupportedEncodeType,
    FieldPopulation,
    LimitExceeded,
}

impl ErrorKind {
    /// Stable snake_case name, suitable for structured log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedFraming => "malformed_framing",
            Self::OutOfRangeReference => "out_of_range_reference",
            Self::DisallowedType => "disallowed_type",
            Self::UnsupportedEncodeType => "unsupported_encode_type",
            Self::FieldPopulation => "field_population",
            Self::LimitExceeded => "limit_exceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-level and layout-level parse failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FramingError {
    /// The input does not start with the `bplist00` header.
    #[error("missing bplist00 header")]
    BadMagic,

    /// The input is too short to hold the structure being read.
    #[error("truncated input: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Offset of the read.
        offset: usize,
        /// Bytes required.
        needed: usize,
        /// Bytes remaining.
        available: usize,
    },

    /// The 32-byte trailer carries impossible values.
    #[error("invalid trailer: {0}")]
    InvalidTrailer(String),

    /// An object reference points outside the offset table.
    #[error("object reference {reference} out of range ({count} objects)")]
    InvalidObjectRef {
        /// The reference read from the stream.
        reference: u64,
        /// Number of objects declared in the trailer.
        count: u64,
    },

    /// An object's offset points outside the object area.
    #[error("object {index} has offset {offset} outside the object area")]
    InvalidOffset {
        /// Object index.
        index: u64,
        /// Offending offset.
        offset: u64,
    },

    /// Unknown or unsupported object marker byte.
    #[error("unsupported object marker 0x{marker:02x} at offset {offset}")]
    UnsupportedMarker {
        /// The marker byte.
        marker: u8,
        /// Offset of the marker.
        offset: usize,
    },

    /// An integer object is wider than 64 bits or has an invalid width.
    #[error("invalid integer encoding at offset {0}")]
    InvalidInteger(usize),

    /// A string object is not valid in its declared encoding.
    #[error("invalid string encoding at offset {0}")]
    InvalidString(usize),

    /// A dictionary key is not a string.
    #[error("dictionary key at offset {0} is not a string")]
    NonStringKey(usize),

    /// A container references itself, directly or transitively.
    #[error("container object {0} references itself")]
    ContainerCycle(u64),

    /// The archive was not produced by the keyed archiver.
    #[error("unexpected archiver \"{0}\"")]
    WrongArchiver(String),

    /// The keyed-archive version is not supported.
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(i64),

    /// A required key is missing from the top-level dictionary.
    #[error("missing required key \"{0}\"")]
    MissingKey(&'static str),

    /// A value has a shape the keyed-archive layout does not allow.
    #[error("unexpected shape: {0}")]
    UnexpectedShape(String),

    /// A non-object table entry resolves back into itself.
    #[error("table entry {0} is part of a reference cycle without an owning object")]
    CyclicEntry(u64),
}

/// Failure to coerce a decoded value into a field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// The value has the wrong shape for this field.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Shape the field accepts.
        expected: &'static str,
        /// Shape that was supplied.
        found: &'static str,
    },

    /// Paired member lists disagree in length.
    #[error("length mismatch: {left} keys but {right} values")]
    LengthMismatch {
        /// Number of keys.
        left: usize,
        /// Number of values.
        right: usize,
    },

    /// A required field was never supplied.
    #[error("missing required field")]
    Missing,

    /// Any other domain-specific rejection.
    #[error("{0}")]
    Invalid(String),
}
