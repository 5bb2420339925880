//! Bookkeeping for one in-flight multipart upload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{CompleteRequest, CompletedPart};

/// Lifecycle of an upload session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initialized,
    PartsUploading,
    PartsComplete,
    Committed,
    Abandoned,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initialized => "initialized",
            SessionState::PartsUploading => "parts_uploading",
            SessionState::PartsComplete => "parts_complete",
            SessionState::Committed => "committed",
            SessionState::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("part {0} is not part of this upload")]
    UnknownPart(u32),

    #[error("part {0} already has a completion token")]
    DuplicatePart(u32),

    #[error("{} part(s) have no completion token", .0.len())]
    MissingParts(Vec<u32>),
}

/// One multipart upload, owned by the orchestrator for its duration.
#[derive(Debug, Clone)]
pub struct UploadSession {
    object_key: String,
    upload_id: String,
    part_count: u32,
    etags: BTreeMap<u32, String>,
    state: SessionState,
}

impl UploadSession {
    pub fn new(
        object_key: impl Into<String>,
        upload_id: impl Into<String>,
        part_count: u32,
    ) -> Self {
        Self {
            object_key: object_key.into(),
            upload_id: upload_id.into(),
            part_count,
            etags: BTreeMap::new(),
            state: SessionState::Initialized,
        }
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn recorded_parts(&self) -> usize {
        self.etags.len()
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    /// Move from `Initialized` to `PartsUploading`.
    pub fn begin_transfer(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Initialized)?;
        self.state = if self.part_count == 0 {
            SessionState::PartsComplete
        } else {
            SessionState::PartsUploading
        };
        Ok(())
    }

    /// Record the completion token of one part.
    ///
    /// Moves to `PartsComplete` once every part has a token.
    pub fn record_part(
        &mut self,
        part_number: u32,
        etag: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.expect_state(SessionState::PartsUploading)?;
        if part_number == 0 || part_number > self.part_count {
            return Err(SessionError::UnknownPart(part_number));
        }
        if self.etags.contains_key(&part_number) {
            return Err(SessionError::DuplicatePart(part_number));
        }

        self.etags.insert(part_number, etag.into());
        if self.etags.len() as u32 == self.part_count {
            self.state = SessionState::PartsComplete;
        }
        Ok(())
    }

    /// Part numbers still waiting for a completion token.
    pub fn missing_parts(&self) -> Vec<u32> {
        (1..=self.part_count)
            .filter(|n| !self.etags.contains_key(n))
            .collect()
    }

    /// The ordered part list, available only when every part has a token.
    pub fn completed_parts(&self) -> Result<Vec<CompletedPart>, SessionError> {
        let missing = self.missing_parts();
        if !missing.is_empty() {
            return Err(SessionError::MissingParts(missing));
        }
        self.expect_state(SessionState::PartsComplete)?;

        Ok(self
            .etags
            .iter()
            .map(|(part_number, etag)| CompletedPart {
                part_number: *part_number,
                etag: etag.clone(),
            })
            .collect())
    }

    /// Build the commit request.
    pub fn commit_request(&self) -> Result<CompleteRequest, SessionError> {
        Ok(CompleteRequest {
            object_key: self.object_key.clone(),
            upload_id: self.upload_id.clone(),
            parts: self.completed_parts()?,
        })
    }

    /// Move from `PartsComplete` to `Committed`.
    pub fn mark_committed(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::PartsComplete)?;
        self.state = SessionState::Committed;
        Ok(())
    }

    /// Give up on the session. A committed session stays committed.
    pub fn abandon(&mut self) {
        if self.state != SessionState::Committed {
            self.state = SessionState::Abandoned;
        }
    }
}
