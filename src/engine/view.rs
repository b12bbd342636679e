use crate::errors::AppError;
use super::cancel::{LoadGate, LoadTicket};
use super::reconcile::RosterLoad;
use super::session::{EditSession, SessionState};

/// One operator's roster view: the current session plus the gate that
/// orders concurrent loads. Only the newest load may install its result.
#[derive(Debug, Default)]
pub struct RosterView {
    gate: LoadGate,
    session: Option<EditSession>,
}

impl RosterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load. Any load still in flight becomes stale.
    pub fn begin_load(&self) -> LoadTicket {
        self.gate.begin()
    }

    /// Install a finished load, unless a newer one was started meanwhile
    /// or the current session is editing with unsaved changes. A session
    /// left in `Committing` or `Discarding` is replaced.
    pub fn apply(&mut self, ticket: &LoadTicket, load: RosterLoad) -> Result<&mut EditSession, AppError> {
        ticket.ensure_current()?;
        if let Some(session) = &self.session {
            if session.state() == SessionState::Editing && session.has_unsaved_changes() {
                return Err(AppError::InvalidState(
                    "commit or discard the current edits before switching roster".to_string(),
                ));
            }
        }
        Ok(self.session.insert(EditSession::from_load(load)))
    }

    /// Tear the view down; in-flight loads are dropped when they return.
    pub fn close(&mut self) {
        self.gate.cancel();
        self.session = None;
    }

    pub fn session(&self) -> Result<&EditSession, AppError> {
        self.session
            .as_ref()
            .ok_or_else(|| AppError::InvalidState("no roster loaded".to_string()))
    }

    pub fn session_mut(&mut self) -> Result<&mut EditSession, AppError> {
        self.session
            .as_mut()
            .ok_or_else(|| AppError::InvalidState("no roster loaded".to_string()))
    }
}
