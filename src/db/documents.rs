// src/db/documents.rs
// Document row access: status tracking and the transactional chunk insert.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunker::SemanticChunk;
use crate::source::SourceTarget;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// The pipeline's view of a document row.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub storage_path: Option<String>,
}

/// Lifecycle fields exposed to status readers.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatus {
    pub processing_status: String,
    pub processing_error: Option<String>,
}

/// A chunk row ready for insertion: embedding and keywords JSON-encoded.
#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub id: String,
    pub document_id: String,
    pub document_scope: &'static str,
    pub chunk_index: i64,
    pub content: String,
    pub embedding_json: String,
    pub section_title: String,
    pub summary: String,
    pub keywords_json: String,
    pub section_level: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub tokens: i64,
    pub page_number: Option<i64>,
    pub created_at: String,
}

impl ChunkRow {
    /// Zips one chunk with its embedding and document linkage.
    pub fn build(
        document_id: &str,
        scope: &'static str,
        chunk: &SemanticChunk,
        embedding: &[f32],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            document_scope: scope,
            chunk_index: chunk.chunk_index as i64,
            content: chunk.content.clone(),
            embedding_json: serde_json::to_string(embedding)?,
            section_title: chunk.section_title.clone(),
            summary: chunk.summary.clone(),
            keywords_json: serde_json::to_string(&chunk.keywords)?,
            section_level: chunk.section_level,
            start_char: chunk.start_char,
            end_char: chunk.end_char,
            tokens: chunk.tokens,
            page_number: chunk.page_number,
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

/// SQLite-backed document store shared across handlers.
#[derive(Clone)]
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Cheap connectivity probe for the health endpoint.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn get_document(
        &self,
        target: SourceTarget,
        document_id: &str,
    ) -> Result<Option<DocumentRow>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, {} FROM {} WHERE id = ?1",
            target.path_field, target.table
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![document_id], |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                storage_path: row.get(1)?,
            })
        })?;
        rows.next().transpose().map_err(StoreError::from)
    }

    pub fn status(
        &self,
        target: SourceTarget,
        document_id: &str,
    ) -> Result<Option<DocumentStatus>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT processing_status, processing_error FROM {} WHERE id = ?1",
            target.table
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![document_id], |row| {
            Ok(DocumentStatus {
                processing_status: row.get(0)?,
                processing_error: row.get(1)?,
            })
        })?;
        rows.next().transpose().map_err(StoreError::from)
    }

    /// Conditional idle → processing transition. Returns false when another
    /// run already holds the document (zero rows updated).
    pub fn try_mark_processing(
        &self,
        target: SourceTarget,
        document_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE {} SET processing_status = 'processing', processing_error = NULL, \
             updated_at = ?2 WHERE id = ?1 AND processing_status != 'processing'",
            target.table
        );
        let updated = conn.execute(&sql, params![document_id, Utc::now().to_rfc3339()])?;
        debug!(document_id, table = target.table, acquired = updated > 0, "Processing transition");
        Ok(updated > 0)
    }

    pub fn mark_error(
        &self,
        target: SourceTarget,
        document_id: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE {} SET processing_status = 'error', processing_error = ?2, \
             updated_at = ?3 WHERE id = ?1",
            target.table
        );
        conn.execute(&sql, params![document_id, message, Utc::now().to_rfc3339()])?;
        info!(document_id, table = target.table, error = message, "Document marked error");
        Ok(())
    }

    /// Finalizes a successful run in one transaction: removes any chunk rows
    /// from a prior run of this document, inserts the new batch, and flips
    /// the status to done. Rolls back entirely on any failure.
    pub fn finalize(
        &self,
        target: SourceTarget,
        document_id: &str,
        scope: &str,
        rows: &[ChunkRow],
    ) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1 AND document_scope = ?2",
            params![document_id, scope],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, document_id, document_scope, chunk_index, content, \
                 embedding, section_title, summary, keywords, section_level, start_char, \
                 end_char, tokens, page_number, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.id,
                    row.document_id,
                    row.document_scope,
                    row.chunk_index,
                    row.content,
                    row.embedding_json,
                    row.section_title,
                    row.summary,
                    row.keywords_json,
                    row.section_level,
                    row.start_char,
                    row.end_char,
                    row.tokens,
                    row.page_number,
                    row.created_at,
                ])?;
            }
        }

        let status_sql = format!(
            "UPDATE {} SET processing_status = 'done', processing_error = NULL, \
             updated_at = ?2 WHERE id = ?1",
            target.table
        );
        tx.execute(&status_sql, params![document_id, Utc::now().to_rfc3339()])?;

        tx.commit()?;
        info!(document_id, table = target.table, chunks = rows.len(), "Run finalized");
        Ok(rows.len())
    }

    /// Number of chunk rows currently persisted for a document.
    pub fn chunk_count(&self, document_id: &str, scope: &str) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE document_id = ?1 AND document_scope = ?2",
            params![document_id, scope],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
