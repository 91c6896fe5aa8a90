// src/source.rs

use serde::{Deserialize, Serialize};

/// Visibility variant of an uploaded document. Closed set; the trigger
/// request's `type` field deserializes into this directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }
}

/// Where a document of a given visibility lives: the table holding its row,
/// the storage bucket holding its file, and the column storing the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTarget {
    pub table: &'static str,
    pub bucket: &'static str,
    pub path_field: &'static str,
}

/// Maps a visibility variant to its backing table, bucket, and path column.
pub fn resolve(visibility: Visibility) -> SourceTarget {
    match visibility {
        Visibility::Private => SourceTarget {
            table: "documents",
            bucket: "documents",
            path_field: "file_path",
        },
        Visibility::Public => SourceTarget {
            table: "public_documents",
            bucket: "public-documents",
            path_field: "storage_path",
        },
    }
}
