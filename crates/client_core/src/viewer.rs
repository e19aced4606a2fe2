use std::{collections::VecDeque, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use futures::{future::BoxFuture, FutureExt};
use shared::{
    domain::{RequestId, TouchFilter},
    error::{FailureKind, ViewerFailure},
    protocol::{drawing_directive, touch_directive, MenuResult, ServerMessage, START_DIRECTIVE},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    config::ViewerConfig,
    fold::{fold_drawing, fold_touch},
    merge::merge_all,
    registry::Registry,
    scheduler::{
        PendingRequest, RequestKind, RequestScheduler, RetryDecision, SessionKind, TouchZoneInfo,
    },
    shadow::{CompletedSession, SessionCheck, ShadowCoordinator},
    store::{MemoryStateStore, StateStore, WindowDimensions},
    transport::DrawingTransport,
    translator::{MenuTranslator, PfodMenuTranslator},
    transform::FALLBACK_DRAWING_SIZE,
};

const MAX_LOGICAL_SIZE: u32 = 255;

/// The registry the renderer reads. Replaced atomically as a whole.
#[derive(Clone, Default)]
pub struct LiveView {
    current: Arc<ArcSwap<Registry>>,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    fn publish(&self, registry: Registry) {
        self.current.store(Arc::new(registry));
    }
}

#[derive(Debug, Clone)]
pub enum ViewerEvent {
    /// A new registry is live. `session` is `None` for direct edits.
    Published {
        session: Option<SessionKind>,
        primary: Option<String>,
    },
    /// Queue drained with no session open; redraw what is live.
    Redraw,
    SessionAbandoned {
        kind: SessionKind,
        discarded: usize,
    },
    Failed(ViewerFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchRequest {
    pub drawing_name: String,
    pub cmd: String,
    pub filter: TouchFilter,
    pub col: i64,
    pub row: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    Start,
    Reload,
    Touch(TouchRequest),
    PointerDown,
    PointerUp,
    RemoveDrawing(String),
    Resize { width: u32, height: u32 },
    Shutdown,
}

/// A request the caller should now send.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub id: RequestId,
    pub url: Url,
}

enum Wake {
    Command(Option<ViewerCommand>),
    Response(RequestId, Result<String>),
    Resume,
    Refresh,
}

struct DeferredResponse {
    request: PendingRequest,
    message: ServerMessage,
}

pub struct Viewer {
    config: ViewerConfig,
    transport: Arc<dyn DrawingTransport>,
    translator: Box<dyn MenuTranslator>,
    store: Box<dyn StateStore>,
    scheduler: RequestScheduler,
    coordinator: ShadowCoordinator,
    live: LiveView,
    events: broadcast::Sender<ViewerEvent>,
    deferred: VecDeque<DeferredResponse>,
    identifier: String,
    pointer_active: bool,
    updates_enabled: bool,
    idle_notified: bool,
    failure: Option<ViewerFailure>,
    resume_at: Option<Instant>,
    refresh_at: Option<Instant>,
}

impl Viewer {
    pub fn new(config: ViewerConfig, transport: Arc<dyn DrawingTransport>) -> Self {
        Self::new_with_dependencies(
            config,
            transport,
            Box::new(PfodMenuTranslator),
            Box::new(MemoryStateStore::new()),
        )
    }

    pub fn new_with_dependencies(
        config: ViewerConfig,
        transport: Arc<dyn DrawingTransport>,
        translator: Box<dyn MenuTranslator>,
        store: Box<dyn StateStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            scheduler: RequestScheduler::new(config.max_retries),
            identifier: config.identifier.clone(),
            config,
            transport,
            translator,
            store,
            coordinator: ShadowCoordinator::new(),
            live: LiveView::new(),
            events,
            deferred: VecDeque::new(),
            pointer_active: false,
            updates_enabled: true,
            idle_notified: false,
            failure: None,
            resume_at: None,
            refresh_at: None,
        }
    }

    pub fn live_view(&self) -> LiveView {
        self.live.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ViewerEvent> {
        self.events.subscribe()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn failure(&self) -> Option<&ViewerFailure> {
        self.failure.as_ref()
    }

    pub fn updates_enabled(&self) -> bool {
        self.updates_enabled
    }

    pub fn refresh_due(&self) -> Option<Instant> {
        self.refresh_at
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    pub fn active_session(&self) -> Option<SessionKind> {
        self.coordinator.active_kind()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Primary of the registry that will be published next.
    pub fn primary_name(&self) -> Option<String> {
        match self.coordinator.session() {
            Some(session) => session.shadow.primary_name().map(str::to_string),
            None => self.live.load().primary_name().map(str::to_string),
        }
    }

    /// Queues the start directive; the server answers with its menu.
    pub fn start(&mut self) -> RequestId {
        let url = self.config.endpoint(START_DIRECTIVE, None);
        self.enqueue(None, url, RequestKind::SessionStart, None)
    }

    /// Re-requests the primary drawing.
    pub fn reload(&mut self) -> Option<RequestId> {
        let Some(primary) = self.primary_name() else {
            warn!("reload requested before any drawing is known");
            return None;
        };
        let url = self.versioned_endpoint(&primary);
        Some(self.enqueue(Some(primary), url, RequestKind::Primary, None))
    }

    pub fn touch(&mut self, touch: TouchRequest) -> RequestId {
        let directive = touch_directive(&self.identifier, &touch.cmd, touch.col, touch.row);
        let url = self.config.endpoint(&directive, None);
        let info = TouchZoneInfo {
            cmd: touch.cmd,
            filter: touch.filter,
        };
        self.enqueue(Some(touch.drawing_name), url, RequestKind::Touch, Some(info))
    }

    pub fn pointer_down(&mut self) {
        self.pointer_active = true;
        self.refresh_at = None;
        self.abandon_superseded();
    }

    /// Ends a pointer interaction and folds everything that arrived during it.
    pub fn pointer_up(&mut self) {
        self.pointer_active = false;
        self.idle_notified = false;
        if !self.deferred.is_empty() {
            debug!(count = self.deferred.len(), "folding responses deferred during interaction");
        }
        while let Some(DeferredResponse { request, message }) = self.deferred.pop_front() {
            self.fold_response(request, message);
        }
        self.check_session();
    }

    /// Fired by the refresh deadline.
    pub fn fetch_refresh(&mut self, now: Instant) {
        self.refresh_at = None;
        if !self.updates_enabled {
            return;
        }
        if self.coordinator.active_kind().is_some() {
            debug!("refresh skipped; shadow session still open");
            return;
        }
        if self.pointer_active || !self.scheduler.is_idle() {
            debug!("refresh postponed; viewer busy");
            self.schedule_refresh_after(now);
            return;
        }
        let Some(primary) = self.live.load().primary_name().map(str::to_string) else {
            return;
        };
        let url = self.versioned_endpoint(&primary);
        self.enqueue(Some(primary), url, RequestKind::Refresh, None);
    }

    /// Drops a drawing, everything it embeds and any requests for them.
    pub fn remove_drawing(&mut self, name: &str) -> Vec<String> {
        let mut removed = match self.coordinator.session_mut() {
            Some(session) => session.shadow.remove_drawing(name),
            None => Vec::new(),
        };
        let mut registry = Registry::clone(&self.live.load());
        let from_live = registry.remove_drawing(name);
        if !from_live.is_empty() {
            registry.set_merged(merge_all(&registry).unwrap_or_default());
            self.publish(None, registry);
        }
        for drawing in from_live {
            if !removed.contains(&drawing) {
                removed.push(drawing);
            }
        }
        for drawing in &removed {
            self.scheduler.purge_drawing(drawing);
        }
        info!(drawing = name, removed = removed.len(), "removed drawing");
        self.settle_session();
        removed
    }

    /// Saves window dimensions derived from the primary drawing. Returns
    /// whether anything was written.
    pub fn record_dimensions(&mut self, window_width: u32, window_height: u32) -> Result<bool> {
        let live = self.live.load();
        let meta = live.primary().and_then(|drawing| drawing.meta.as_ref());
        let logical = |value: Option<f64>| {
            let value = value.unwrap_or(FALLBACK_DRAWING_SIZE).round();
            (value.max(1.0) as u32).clamp(1, MAX_LOGICAL_SIZE)
        };
        let dimensions = WindowDimensions {
            logical_width: logical(meta.and_then(|meta| meta.width)),
            logical_height: logical(meta.and_then(|meta| meta.height)),
            window_width,
            window_height,
        };
        let key = self.config.dimensions_key.clone();
        if self.store.dimensions(&key) == Some(dimensions) {
            return Ok(false);
        }
        self.store
            .set_dimensions(&key, dimensions)
            .context("failed to save window dimensions")?;
        debug!(?dimensions, "saved window dimensions");
        Ok(true)
    }

    /// Moves the next queued request in flight, opening a session for root
    /// requests. Returns `None` while waiting or when there is nothing to do.
    pub fn next_dispatch(&mut self, now: Instant) -> Option<Dispatch> {
        if self.scheduler.in_flight().is_some() {
            return None;
        }
        if self.resume_at.is_some_and(|resume_at| resume_at > now) {
            return None;
        }
        self.resume_at = None;
        if self.scheduler.queued_len() == 0 {
            self.on_idle(now);
            return None;
        }
        let request = self.scheduler.dispatch_next()?.clone();
        if let Some(kind) = request.kind.session_kind() {
            let live = self.live.load();
            if let Some(replaced) = self.coordinator.begin(kind, &live) {
                self.report_abandoned(replaced.kind(), replaced.responses);
            }
        }
        debug!(
            id = request.id.0,
            kind = ?request.kind,
            attempt = request.retry_count,
            url = %request.endpoint,
            "dispatching request"
        );
        Some(Dispatch {
            id: request.id,
            url: request.endpoint,
        })
    }

    /// Feeds back the outcome of a dispatched request.
    pub fn on_response(&mut self, id: RequestId, outcome: Result<String>, now: Instant) {
        let Some(request) = self.scheduler.finish(id) else {
            warn!(id = id.0, "response for a request that is not in flight");
            return;
        };
        self.idle_notified = false;
        let parsed = outcome.and_then(|body| {
            serde_json::from_str::<ServerMessage>(&body)
                .map_err(crate::error::ViewerError::from)
                .context("failed to parse server message")
        });
        match parsed {
            Ok(message) => self.on_message(request, message),
            Err(err) => self.on_failure(request, err, now),
        }
    }

    pub fn handle_command(&mut self, command: ViewerCommand) {
        match command {
            ViewerCommand::Start => {
                self.start();
            }
            ViewerCommand::Reload => {
                self.reload();
            }
            ViewerCommand::Touch(touch) => {
                self.touch(touch);
            }
            ViewerCommand::PointerDown => self.pointer_down(),
            ViewerCommand::PointerUp => self.pointer_up(),
            ViewerCommand::RemoveDrawing(name) => {
                self.remove_drawing(&name);
            }
            ViewerCommand::Resize { width, height } => {
                if let Err(err) = self.record_dimensions(width, height) {
                    warn!(error = %err, "could not record window dimensions");
                }
            }
            ViewerCommand::Shutdown => {}
        }
    }

    /// Drives the viewer until `Shutdown` arrives or every sender is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ViewerCommand>) -> Result<()> {
        let mut in_flight: Option<BoxFuture<'static, (RequestId, Result<String>)>> = None;
        loop {
            if in_flight.is_none() {
                if let Some(dispatch) = self.next_dispatch(Instant::now()) {
                    let transport = Arc::clone(&self.transport);
                    in_flight = Some(
                        async move {
                            let outcome = transport.fetch(&dispatch.url).await;
                            (dispatch.id, outcome)
                        }
                        .boxed(),
                    );
                }
            }
            let resume_at = self.resume_at;
            let refresh_at = self.refresh_at;

            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                (id, outcome) = async {
                    match in_flight.as_mut() {
                        Some(fetch) => fetch.await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => Wake::Response(id, outcome),
                _ = sleep_until(resume_at.unwrap_or_else(Instant::now)), if resume_at.is_some() && in_flight.is_none() => Wake::Resume,
                _ = sleep_until(refresh_at.unwrap_or_else(Instant::now)), if refresh_at.is_some() => Wake::Refresh,
            };

            match wake {
                Wake::Command(Some(ViewerCommand::Shutdown)) | Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Response(id, outcome) => {
                    in_flight = None;
                    self.on_response(id, outcome, Instant::now());
                }
                Wake::Resume => self.resume_at = None,
                Wake::Refresh => self.fetch_refresh(Instant::now()),
            }
        }
        info!("viewer stopped");
        Ok(())
    }

    /// Runs the viewer on its own task.
    pub fn spawn(self) -> (mpsc::Sender<ViewerCommand>, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(256);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    fn enqueue(
        &mut self,
        drawing_name: Option<String>,
        url: Url,
        kind: RequestKind,
        touch: Option<TouchZoneInfo>,
    ) -> RequestId {
        let id = self.scheduler.enqueue(drawing_name, url, kind, touch);
        self.idle_notified = false;
        self.refresh_at = None;
        self.abandon_superseded();
        id
    }

    fn versioned_endpoint(&self, drawing_name: &str) -> Url {
        let version = self.store.version(drawing_name);
        let directive = drawing_directive(drawing_name, version.as_deref());
        self.config.endpoint(&directive, version.as_deref())
    }

    fn abandon_superseded(&mut self) {
        if let Some(abandoned) = self
            .coordinator
            .abandon_if_superseded(&self.scheduler, self.pointer_active)
        {
            self.report_abandoned(abandoned.kind(), abandoned.responses);
        }
    }

    fn report_abandoned(&self, kind: SessionKind, discarded: usize) {
        if discarded == 0 {
            debug!(?kind, "closed empty shadow session");
            return;
        }
        let _ = self
            .events
            .send(ViewerEvent::SessionAbandoned { kind, discarded });
    }

    fn on_message(&mut self, request: PendingRequest, message: ServerMessage) {
        if request.discard {
            debug!(id = request.id.0, "discarding superseded response");
            self.settle_session();
            return;
        }
        if message.is_menu() {
            self.on_menu(&message);
            return;
        }
        let drag_cmd = request
            .touch
            .as_ref()
            .filter(|touch| touch.filter.is_drag())
            .map(|touch| touch.cmd.clone());
        if let Some(cmd) = drag_cmd.as_deref() {
            if self.scheduler.has_newer_drag(cmd) {
                debug!(cmd, "dropping stale drag response");
                self.settle_session();
                return;
            }
        }
        if self.pointer_active {
            if let Some(cmd) = drag_cmd.as_deref() {
                self.deferred.retain(|deferred| !deferred.request.is_drag_for(cmd));
            }
            self.deferred.push_back(DeferredResponse { request, message });
            return;
        }
        self.fold_response(request, message);
        self.check_session();
    }

    fn on_menu(&mut self, message: &ServerMessage) {
        match self.translator.translate(&message.cmd) {
            MenuResult::Error { message } => {
                self.fail(FailureKind::Protocol, format!("menu rejected: {message}"));
            }
            MenuResult::Menu {
                drawing_name,
                identifier,
            } => {
                self.identifier = identifier;
                let target = if drawing_name.trim().is_empty() {
                    self.primary_name()
                } else {
                    Some(drawing_name)
                };
                let Some(target) = target else {
                    warn!("menu names no drawing and none is loaded");
                    return;
                };
                let stored = self.store.version(&target);
                let version = stored.filter(|stored| message.version.as_deref() == Some(stored.as_str()));
                let directive = drawing_directive(&target, version.as_deref());
                let url = self.config.endpoint(&directive, version.as_deref());
                info!(drawing = %target, identifier = %self.identifier, cached = version.is_some(), "menu selected drawing");
                self.enqueue(Some(target), url, RequestKind::Primary, None);
            }
        }
    }

    fn fold_response(&mut self, request: PendingRequest, message: ServerMessage) {
        let Some(session) = self.coordinator.session_mut() else {
            debug!(id = request.id.0, "no shadow session open; dropping response");
            return;
        };
        if !session.kind().is_related(request.kind) {
            debug!(id = request.id.0, kind = ?request.kind, "response outlived its session; dropping");
            return;
        }
        if request.kind == RequestKind::Touch {
            fold_touch(&mut session.shadow, request.drawing_name.as_deref(), &message);
            session.responses += 1;
            return;
        }
        let Some(name) = request.drawing_name else {
            warn!(id = request.id.0, "drawing response without a drawing name");
            return;
        };
        if request.kind == RequestKind::Primary {
            session.shadow.set_primary(&name);
        }
        let outcome = fold_drawing(&mut session.shadow, &name, &message);
        session.responses += 1;
        if let Some(version) = message.version.as_deref() {
            if let Err(err) = self.store.set_version(&name, version) {
                warn!(drawing = %name, error = %err, "could not store version");
            }
        }
        self.queue_embeds(outcome.embeds);
    }

    fn queue_embeds(&mut self, targets: Vec<String>) {
        let Some(kind) = self.coordinator.active_kind() else {
            return;
        };
        let refreshing = kind == SessionKind::Refresh;
        let mut wanted = Vec::new();
        if let Some(session) = self.coordinator.session_mut() {
            for target in targets {
                if self.scheduler.is_pending_drawing(&target) {
                    continue;
                }
                let missing = !session.shadow.has_received(&target);
                if (refreshing || missing) && session.requested_embeds.insert(target.clone()) {
                    wanted.push(target);
                }
            }
        }
        for target in wanted {
            let (url, kind) = if refreshing {
                (self.versioned_endpoint(&target), RequestKind::RefreshEmbed)
            } else {
                (
                    self.config.endpoint(&drawing_directive(&target, None), None),
                    RequestKind::Embed,
                )
            };
            self.enqueue(Some(target), url, kind, None);
        }
    }

    fn on_failure(&mut self, request: PendingRequest, err: anyhow::Error, now: Instant) {
        if request.discard {
            debug!(id = request.id.0, error = %err, "superseded request failed");
            self.settle_session();
            return;
        }
        warn!(
            id = request.id.0,
            drawing = ?request.drawing_name,
            attempt = request.retry_count + 1,
            kind = ?FailureKind::Transient,
            error = %err,
            "request failed"
        );
        let primary = self.primary_name();
        match self.scheduler.retry(request) {
            RetryDecision::Requeued { attempt } => {
                debug!(attempt, "retrying request");
                self.resume_at = Some(now + self.config.retry_delay);
            }
            RetryDecision::Exhausted(request) => {
                let name = request.drawing_name.clone().unwrap_or_default();
                let fatal = matches!(request.kind, RequestKind::SessionStart | RequestKind::Primary)
                    || (primary.is_some() && request.drawing_name == primary);
                let attempts = self.scheduler.max_retries() + 1;
                if fatal {
                    self.fail(
                        FailureKind::RetriesExhausted,
                        format!("failed to load drawing \"{name}\" after {attempts} attempts: {err}"),
                    );
                } else {
                    warn!(
                        drawing = %name,
                        attempts,
                        kind = ?FailureKind::MissingEmbed,
                        "giving up on embedded drawing"
                    );
                }
                self.settle_session();
            }
        }
    }

    /// Checks the session unless the pointer is down; `pointer_up` checks
    /// once the deferred responses are folded.
    fn settle_session(&mut self) {
        if !self.pointer_active {
            self.check_session();
        }
    }

    fn check_session(&mut self) {
        match self.coordinator.check(&self.scheduler, self.pointer_active) {
            SessionCheck::Inactive | SessionCheck::Waiting => {}
            SessionCheck::Abandoned { kind, discarded } => self.report_abandoned(kind, discarded),
            SessionCheck::Complete(done) => self.complete(done),
        }
    }

    fn complete(&mut self, done: CompletedSession) {
        if done.responses == 0 {
            debug!(kind = ?done.kind, "closing session without responses");
            return;
        }
        self.publish(Some(done.kind), done.registry);
    }

    fn publish(&mut self, session: Option<SessionKind>, registry: Registry) {
        let primary = registry.primary_name().map(str::to_string);
        info!(
            ?session,
            primary = ?primary,
            drawings = registry.len(),
            items = registry.merged().unindexed.len() + registry.merged().indexed.len(),
            "published registry"
        );
        self.live.publish(registry);
        let _ = self.events.send(ViewerEvent::Published { session, primary });
    }

    fn on_idle(&mut self, now: Instant) {
        if self.idle_notified {
            return;
        }
        self.idle_notified = true;
        if self.coordinator.active_kind().is_none() {
            let _ = self.events.send(ViewerEvent::Redraw);
            self.schedule_refresh(now);
        }
    }

    fn schedule_refresh(&mut self, now: Instant) {
        self.refresh_at = None;
        if !self.updates_enabled || self.pointer_active || !self.scheduler.is_idle() {
            return;
        }
        self.schedule_refresh_after(now);
    }

    fn schedule_refresh_after(&mut self, now: Instant) {
        let live = self.live.load();
        let refresh_ms = live
            .primary()
            .and_then(|drawing| drawing.meta.as_ref())
            .map_or(0, |meta| meta.refresh_ms);
        if refresh_ms == 0 {
            return;
        }
        self.refresh_at = Some(now + Duration::from_millis(refresh_ms));
        debug!(refresh_ms, "scheduled refresh");
    }

    fn fail(&mut self, kind: FailureKind, message: String) {
        let failure = ViewerFailure::new(kind, message);
        error!(kind = ?failure.kind, message = %failure.message, "viewer failure");
        if failure.kind.is_fatal() {
            self.updates_enabled = false;
            self.refresh_at = None;
        }
        self.failure = Some(failure.clone());
        let _ = self.events.send(ViewerEvent::Failed(failure));
    }
}

#[cfg(test)]
#[path = "tests/viewer_tests.rs"]
mod tests;
