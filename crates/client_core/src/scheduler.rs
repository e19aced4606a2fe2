use std::collections::VecDeque;

use serde::Serialize;
use shared::domain::{RequestId, TouchFilter};
use tracing::debug;
use url::Url;

/// Why a request was issued. Drives priority, coalescing and session grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    SessionStart,
    Primary,
    Touch,
    Refresh,
    Embed,
    RefreshEmbed,
}

impl RequestKind {
    /// The session a request of this kind opens when dispatched, if any.
    pub fn session_kind(self) -> Option<SessionKind> {
        match self {
            RequestKind::SessionStart => Some(SessionKind::SessionStart),
            RequestKind::Primary => Some(SessionKind::Primary),
            RequestKind::Touch => Some(SessionKind::Touch),
            RequestKind::Refresh => Some(SessionKind::Refresh),
            RequestKind::Embed | RequestKind::RefreshEmbed => None,
        }
    }
}

/// Kinds of shadow session, ordered from lowest to highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Refresh,
    Touch,
    Primary,
    SessionStart,
}

impl SessionKind {
    pub fn request_kind(self) -> RequestKind {
        match self {
            SessionKind::SessionStart => RequestKind::SessionStart,
            SessionKind::Primary => RequestKind::Primary,
            SessionKind::Touch => RequestKind::Touch,
            SessionKind::Refresh => RequestKind::Refresh,
        }
    }

    /// Whether an outstanding request of `kind` still belongs to this session.
    pub fn is_related(self, kind: RequestKind) -> bool {
        kind == self.request_kind()
            || kind == RequestKind::Embed
            || (self == SessionKind::Refresh && kind == RequestKind::RefreshEmbed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchZoneInfo {
    pub cmd: String,
    pub filter: TouchFilter,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: RequestId,
    pub drawing_name: Option<String>,
    pub endpoint: Url,
    pub kind: RequestKind,
    pub retry_count: u32,
    pub touch: Option<TouchZoneInfo>,
    /// Set when a newer request supersedes this one after it was sent.
    pub discard: bool,
}

impl PendingRequest {
    pub fn is_drag_for(&self, cmd: &str) -> bool {
        self.touch
            .as_ref()
            .is_some_and(|touch| touch.filter.is_drag() && touch.cmd == cmd)
    }

    pub fn targets(&self, drawing_name: &str) -> bool {
        self.drawing_name.as_deref() == Some(drawing_name)
    }
}

#[derive(Debug)]
pub enum RetryDecision {
    Requeued { attempt: u32 },
    Exhausted(PendingRequest),
}

/// FIFO of outstanding requests with at most one in flight.
#[derive(Debug)]
pub struct RequestScheduler {
    queue: VecDeque<PendingRequest>,
    in_flight: Option<PendingRequest>,
    next_id: u64,
    max_retries: u32,
}

impl RequestScheduler {
    pub fn new(max_retries: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            next_id: 1,
            max_retries,
        }
    }

    pub fn enqueue(
        &mut self,
        drawing_name: Option<String>,
        endpoint: Url,
        kind: RequestKind,
        touch: Option<TouchZoneInfo>,
    ) -> RequestId {
        if kind != RequestKind::Refresh {
            let before = self.queue.len();
            self.queue.retain(|request| request.kind != RequestKind::Refresh);
            let purged = before - self.queue.len();
            if purged > 0 {
                debug!(purged, "dropped queued refresh requests");
            }
            if let Some(in_flight) = self
                .in_flight
                .as_mut()
                .filter(|request| request.kind == RequestKind::Refresh)
            {
                in_flight.discard = true;
            }
        }
        if let Some(touch) = touch.as_ref().filter(|touch| touch.filter.is_drag()) {
            self.queue.retain(|request| !request.is_drag_for(&touch.cmd));
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;
        debug!(id = id.0, ?kind, drawing = ?drawing_name, "queued request");
        self.queue.push_back(PendingRequest {
            id,
            drawing_name,
            endpoint,
            kind,
            retry_count: 0,
            touch,
            discard: false,
        });
        id
    }

    /// Moves the head of the queue in flight. Returns `None` while another
    /// request is outstanding or nothing is queued.
    pub fn dispatch_next(&mut self) -> Option<&PendingRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        self.in_flight = self.queue.pop_front();
        self.in_flight.as_ref()
    }

    pub fn in_flight(&self) -> Option<&PendingRequest> {
        self.in_flight.as_ref()
    }

    /// Takes the in-flight request back once its outcome is known.
    pub fn finish(&mut self, id: RequestId) -> Option<PendingRequest> {
        if self.in_flight.as_ref().is_some_and(|request| request.id == id) {
            self.in_flight.take()
        } else {
            None
        }
    }

    /// Puts a failed request back at the head of the queue, or hands it back
    /// once it has used up its retries.
    pub fn retry(&mut self, mut request: PendingRequest) -> RetryDecision {
        request.retry_count += 1;
        if request.retry_count > self.max_retries {
            return RetryDecision::Exhausted(request);
        }
        let attempt = request.retry_count;
        self.queue.push_front(request);
        RetryDecision::Requeued { attempt }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn queued(&self) -> impl Iterator<Item = &PendingRequest> {
        self.queue.iter()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    pub fn has_queued_kind(&self, kinds: &[RequestKind]) -> bool {
        self.queue.iter().any(|request| kinds.contains(&request.kind))
    }

    /// Whether anything queued or in flight still belongs to `session`.
    pub fn has_related(&self, session: SessionKind) -> bool {
        self.in_flight
            .iter()
            .chain(self.queue.iter())
            .any(|request| session.is_related(request.kind))
    }

    /// Whether a request for `drawing_name` is queued or in flight.
    pub fn is_pending_drawing(&self, drawing_name: &str) -> bool {
        self.in_flight
            .iter()
            .chain(self.queue.iter())
            .any(|request| request.targets(drawing_name))
    }

    /// Whether a later drag for the same zone is already waiting.
    pub fn has_newer_drag(&self, cmd: &str) -> bool {
        self.queue.iter().any(|request| request.is_drag_for(cmd))
    }

    /// Drops queued requests for `drawing_name` and marks an in-flight one
    /// for discard. Returns how many were affected.
    pub fn purge_drawing(&mut self, drawing_name: &str) -> usize {
        let before = self.queue.len();
        self.queue.retain(|request| !request.targets(drawing_name));
        let mut purged = before - self.queue.len();
        if let Some(in_flight) = self
            .in_flight
            .as_mut()
            .filter(|request| request.targets(drawing_name))
        {
            in_flight.discard = true;
            purged += 1;
        }
        purged
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
