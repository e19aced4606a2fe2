use super::*;
use crate::registry::{DrawingMeta, Item};
use serde_json::Map;
use url::Url;

fn endpoint() -> Url {
    Url::parse("http://127.0.0.1/pfodWeb?cmd=%7Bhome%7D").expect("url")
}

fn live_with_home() -> Registry {
    let mut registry = Registry::new();
    let home = registry.ensure_drawing("home", None);
    home.meta = Some(DrawingMeta {
        width: Some(100.0),
        height: Some(100.0),
        ..DrawingMeta::default()
    });
    home.received = true;
    registry
}

#[test]
fn same_kind_continues_and_different_kind_replaces() {
    let live = live_with_home();
    let mut coordinator = ShadowCoordinator::new();

    assert!(coordinator.begin(SessionKind::Primary, &live).is_none());
    coordinator.session_mut().expect("session").responses = 2;
    assert!(coordinator.begin(SessionKind::Primary, &live).is_none());
    assert_eq!(coordinator.session().expect("session").responses, 2);

    let replaced = coordinator.begin(SessionKind::Touch, &live).expect("replaced");
    assert_eq!(replaced.kind(), SessionKind::Primary);
    assert_eq!(coordinator.active_kind(), Some(SessionKind::Touch));
    assert_eq!(coordinator.session().expect("session").responses, 0);
}

#[test]
fn abandonment_follows_priority_order() {
    let live = live_with_home();
    let cases = [
        (SessionKind::Refresh, RequestKind::Touch, false, true),
        (SessionKind::Refresh, RequestKind::Embed, true, true),
        (SessionKind::Refresh, RequestKind::RefreshEmbed, false, false),
        (SessionKind::Touch, RequestKind::Primary, false, true),
        (SessionKind::Touch, RequestKind::Touch, true, false),
        (SessionKind::Primary, RequestKind::SessionStart, false, true),
        (SessionKind::Primary, RequestKind::Touch, false, false),
        (SessionKind::SessionStart, RequestKind::SessionStart, true, false),
    ];

    for (session, queued, pointer_active, expected) in cases {
        let mut coordinator = ShadowCoordinator::new();
        coordinator.begin(session, &live);
        let mut scheduler = RequestScheduler::new(5);
        scheduler.enqueue(Some("home".into()), endpoint(), queued, None);
        assert_eq!(
            coordinator.should_abandon(&scheduler, pointer_active),
            expected,
            "{session:?} with {queued:?} queued, pointer {pointer_active}"
        );
    }
}

#[test]
fn waits_for_related_requests_then_completes_with_merge() {
    let live = live_with_home();
    let mut coordinator = ShadowCoordinator::new();
    let mut scheduler = RequestScheduler::new(5);
    assert!(matches!(coordinator.check(&scheduler, false), SessionCheck::Inactive));

    coordinator.begin(SessionKind::Primary, &live);
    let session = coordinator.session_mut().expect("session");
    session
        .shadow
        .drawing_mut("home")
        .expect("home")
        .unindexed
        .push(Item::shape("rectangle", Map::new()));
    session.responses = 1;

    let embed = scheduler.enqueue(Some("gauge".into()), endpoint(), RequestKind::Embed, None);
    assert!(matches!(coordinator.check(&scheduler, false), SessionCheck::Waiting));

    scheduler.dispatch_next().expect("dispatch");
    scheduler.finish(embed).expect("finish");
    match coordinator.check(&scheduler, false) {
        SessionCheck::Complete(done) => {
            assert_eq!(done.kind, SessionKind::Primary);
            assert_eq!(done.responses, 1);
            assert_eq!(done.registry.merged().unindexed.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(coordinator.active_kind().is_none());
    assert!(live.merged().unindexed.is_empty());
}

#[test]
fn touch_sessions_are_published_without_remerge() {
    let live = live_with_home();
    let mut coordinator = ShadowCoordinator::new();
    let scheduler = RequestScheduler::new(5);
    coordinator.begin(SessionKind::Touch, &live);
    coordinator
        .session_mut()
        .expect("session")
        .shadow
        .drawing_mut("home")
        .expect("home")
        .unindexed
        .push(Item::shape("rectangle", Map::new()));

    match coordinator.check(&scheduler, false) {
        SessionCheck::Complete(done) => assert!(done.registry.merged().unindexed.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn pointer_down_abandons_refresh_session() {
    let live = live_with_home();
    let mut coordinator = ShadowCoordinator::new();
    let scheduler = RequestScheduler::new(5);
    coordinator.begin(SessionKind::Refresh, &live);

    match coordinator.check(&scheduler, true) {
        SessionCheck::Abandoned { kind, discarded } => {
            assert_eq!(kind, SessionKind::Refresh);
            assert_eq!(discarded, 0);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(coordinator.active_kind().is_none());
}
