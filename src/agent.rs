//! The analyst orchestrator: one instance per user session.
//!
//! Composes format detection, ingestion, context building, and the backend
//! gateway around a single [`Session`]. The session lifecycle is
//! empty → ready (successful load) → ready (each answered question).
//! `&mut self` receivers make the serialization of `load`/`ask` within a
//! session structural: a caller holds exclusive access for the duration of
//! either operation.
//!
//! Failure handling:
//! - a failed load leaves the orchestrator empty (never partially loaded);
//! - a failed ask leaves the session and the conversation log untouched;
//! - switching backends touches neither.

use log::{debug, info};

use crate::backend::{create_backend, BackendGateway};
use crate::config::{BackendKind, Config};
use crate::context;
use crate::conversation::ConversationLog;
use crate::error::{AgentError, IngestionError};
use crate::ingest;
use crate::models::{Session, SourceFile};

pub struct Analyst {
    backend: Box<dyn BackendGateway>,
    backend_config: crate::config::BackendConfig,
    limits: crate::config::LimitsConfig,
    session: Option<Session>,
    log: ConversationLog,
}

impl Analyst {
    /// Build an orchestrator with the backend selected by `config`.
    pub fn new(config: &Config) -> Result<Self, AgentError> {
        let backend = create_backend(&config.backend)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Build an orchestrator around an injected gateway (used by tests and
    /// by anything that brings its own backend implementation).
    pub fn with_backend(config: &Config, backend: Box<dyn BackendGateway>) -> Self {
        Analyst {
            backend,
            backend_config: config.backend.clone(),
            limits: config.limits.clone(),
            session: None,
            log: ConversationLog::new(config.limits.history_depth),
        }
    }

    /// Load a file, replacing any previous session wholesale.
    ///
    /// Context and conversation are dataset-specific, so the old session and
    /// the old conversation log are discarded together. That holds on
    /// failure as well: the orchestrator ends up empty rather than
    /// partially populated.
    pub fn load_bytes(
        &mut self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<&Session, IngestionError> {
        self.session = None;
        self.log.reset();

        let (kind, ingested) = ingest::ingest(bytes, filename, self.limits.max_file_bytes)?;
        let context = context::build(
            &ingested.payload,
            &ingested.metadata,
            self.limits.context_budget,
        );
        info!(
            "loaded {} ({}, {} bytes), context {} chars",
            filename,
            kind.as_str(),
            bytes.len(),
            context.len()
        );

        let session = Session {
            source: SourceFile::new(filename, kind, bytes),
            payload: ingested.payload,
            metadata: ingested.metadata,
            context,
        };
        Ok(self.session.insert(session))
    }

    /// Ask a question about the loaded data.
    ///
    /// The turn is appended to the conversation only when the backend
    /// answers; a failed call leaves the log exactly as it was.
    pub async fn ask(&mut self, question: &str) -> Result<String, AgentError> {
        let session = self.session.as_ref().ok_or(AgentError::NoData)?;

        let transcript = self.log.transcript();
        debug!(
            "asking {} backend ({} chars context, {} turns)",
            self.backend.kind().as_str(),
            session.context.len(),
            self.log.len()
        );
        let answer = self
            .backend
            .answer(question, &session.context, &transcript)
            .await?;

        self.log.append(question, &answer);
        Ok(answer)
    }

    /// Swap the active backend kind. Session and conversation are untouched.
    pub fn switch_backend(&mut self, kind: BackendKind) -> Result<(), AgentError> {
        let mut backend_config = self.backend_config.clone();
        backend_config.kind = kind;
        self.backend = create_backend(&backend_config)?;
        self.backend_config = backend_config;
        info!("switched backend to {}", kind.as_str());
        Ok(())
    }

    /// Clear the conversation without touching the loaded data.
    pub fn reset_conversation(&mut self) {
        self.log.reset();
    }

    /// Drop everything: back to the empty state.
    pub fn clear(&mut self) {
        self.session = None;
        self.log.reset();
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.log
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &dyn BackendGateway {
        self.backend.as_ref()
    }
}
