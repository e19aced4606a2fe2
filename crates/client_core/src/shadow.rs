use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::{
    merge::merge_all,
    registry::Registry,
    scheduler::{RequestKind, RequestScheduler, SessionKind},
};

/// A working copy of the registry that collects every response caused by
/// one root request before anything becomes visible.
#[derive(Debug)]
pub struct ShadowSession {
    kind: SessionKind,
    pub shadow: Registry,
    /// Responses folded into `shadow` so far.
    pub responses: usize,
    /// Embed targets already requested during this session.
    pub requested_embeds: HashSet<String>,
}

impl ShadowSession {
    fn new(kind: SessionKind, live: &Registry) -> Self {
        Self {
            kind,
            shadow: live.clone(),
            responses: 0,
            requested_embeds: HashSet::new(),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }
}

#[derive(Debug)]
pub struct CompletedSession {
    pub kind: SessionKind,
    pub registry: Registry,
    pub responses: usize,
}

#[derive(Debug)]
pub enum SessionCheck {
    Inactive,
    Waiting,
    Abandoned { kind: SessionKind, discarded: usize },
    Complete(CompletedSession),
}

#[derive(Debug, Default)]
pub struct ShadowCoordinator {
    session: Option<ShadowSession>,
}

impl ShadowCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for a dispatched root request. A session of the same
    /// kind keeps accumulating; one of a different kind is discarded and
    /// returned.
    pub fn begin(&mut self, kind: SessionKind, live: &Registry) -> Option<ShadowSession> {
        if self.session.as_ref().is_some_and(|session| session.kind == kind) {
            debug!(?kind, "continuing shadow session");
            return None;
        }
        let replaced = self.session.replace(ShadowSession::new(kind, live));
        info!(?kind, replaced = ?replaced.as_ref().map(ShadowSession::kind), "started shadow session");
        replaced
    }

    pub fn active_kind(&self) -> Option<SessionKind> {
        self.session.as_ref().map(ShadowSession::kind)
    }

    pub fn session(&self) -> Option<&ShadowSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ShadowSession> {
        self.session.as_mut()
    }

    /// Whether higher-priority work makes the active session pointless.
    pub fn should_abandon(&self, scheduler: &RequestScheduler, pointer_active: bool) -> bool {
        let Some(kind) = self.active_kind() else {
            return false;
        };
        match kind {
            SessionKind::Refresh => {
                pointer_active
                    || scheduler.has_queued_kind(&[
                        RequestKind::SessionStart,
                        RequestKind::Primary,
                        RequestKind::Touch,
                    ])
            }
            SessionKind::Touch => {
                scheduler.has_queued_kind(&[RequestKind::SessionStart, RequestKind::Primary])
            }
            SessionKind::Primary => scheduler.has_queued_kind(&[RequestKind::SessionStart]),
            SessionKind::SessionStart => false,
        }
    }

    /// Discards the active session if it has been superseded.
    pub fn abandon_if_superseded(
        &mut self,
        scheduler: &RequestScheduler,
        pointer_active: bool,
    ) -> Option<ShadowSession> {
        if !self.should_abandon(scheduler, pointer_active) {
            return None;
        }
        let abandoned = self.session.take()?;
        warn!(
            kind = ?abandoned.kind,
            discarded = abandoned.responses,
            "abandoned shadow session for higher-priority work"
        );
        Some(abandoned)
    }

    /// Closes the session once nothing related is outstanding. Every session
    /// kind except touch is re-merged before it is handed back.
    pub fn check(&mut self, scheduler: &RequestScheduler, pointer_active: bool) -> SessionCheck {
        let Some(kind) = self.active_kind() else {
            return SessionCheck::Inactive;
        };
        if let Some(abandoned) = self.abandon_if_superseded(scheduler, pointer_active) {
            return SessionCheck::Abandoned {
                kind: abandoned.kind,
                discarded: abandoned.responses,
            };
        }
        if scheduler.has_related(kind) {
            return SessionCheck::Waiting;
        }
        let Some(session) = self.session.take() else {
            return SessionCheck::Inactive;
        };
        let mut registry = session.shadow;
        if kind != SessionKind::Touch {
            match merge_all(&registry) {
                Some(merged) => registry.set_merged(merged),
                None => debug!(?kind, "primary drawing not available; keeping previous merge"),
            }
        }
        info!(?kind, responses = session.responses, "shadow session complete");
        SessionCheck::Complete(CompletedSession {
            kind,
            registry,
            responses: session.responses,
        })
    }
}

#[cfg(test)]
#[path = "tests/shadow_tests.rs"]
mod tests;
