use super::*;
use crate::registry::{DrawingMeta, ItemKind, TouchZone};
use serde_json::{json, Map, Value};
use shared::domain::TouchFilter;

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn receive(registry: &mut Registry, name: &str, parent: Option<&str>, size: Option<f64>) {
    let drawing = registry.ensure_drawing(name, parent);
    drawing.meta = Some(DrawingMeta {
        width: size,
        height: size,
        color: None,
        refresh_ms: 0,
    });
    drawing.received = true;
}

fn zone(cmd: &str, parent: &str, transform: Transform) -> TouchZone {
    TouchZone {
        cmd: cmd.to_string(),
        filter: TouchFilter::Touch,
        transform,
        clip: None,
        parent_drawing: parent.to_string(),
        payload: Map::new(),
    }
}

fn home_with_gauge() -> Registry {
    let mut registry = Registry::new();
    receive(&mut registry, "home", None, Some(100.0));
    receive(&mut registry, "gauge", Some("home"), Some(50.0));
    let home = registry.drawing_mut("home").expect("home");
    home.unindexed = vec![
        Item::shape("rectangle", payload(json!({"color": 1}))),
        Item::embed("gauge", 10.0, 10.0),
    ];
    let gauge = registry.drawing_mut("gauge").expect("gauge");
    gauge.unindexed = vec![Item::shape("circle", payload(json!({"radius": 5})))];
    registry
}

fn type_tag(item: &Item) -> &str {
    match &item.kind {
        ItemKind::Shape { type_tag, .. } => type_tag,
        ItemKind::Embed(_) => "insertDwg",
    }
}

#[test]
fn primary_without_embeds_merges_to_its_own_items() {
    let mut registry = Registry::new();
    receive(&mut registry, "home", None, Some(100.0));
    let home = registry.drawing_mut("home").expect("home");
    home.unindexed = vec![
        Item::shape("line", Map::new()).with_transform(Transform::new(3.0, 4.0, 1.0)),
        Item::shape("label", Map::new()),
    ];
    home.indexed
        .insert(2, Item::shape("value", Map::new()).with_transform(Transform::new(1.0, 1.0, 2.0)));

    let merged = merge_all(&registry).expect("merged");
    let home = registry.drawing("home").expect("home");

    let bounds = Some(ClipRegion::new(0.0, 0.0, 100.0, 100.0));
    assert_eq!(merged.unindexed.len(), 2);
    for (merged_item, source) in merged.unindexed.iter().zip(&home.unindexed) {
        assert_eq!(merged_item.kind, source.kind);
        assert_eq!(merged_item.transform, source.transform);
        assert_eq!(merged_item.clip, bounds);
    }
    assert_eq!(merged.indexed[&2].transform, Transform::new(1.0, 1.0, 2.0));
}

#[test]
fn merging_twice_gives_identical_output() {
    let registry = home_with_gauge();
    let first = merge_all(&registry).expect("first");
    let second = merge_all(&registry).expect("second");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
}

#[test]
fn embedded_drawing_is_flattened_at_the_embed_position() {
    let registry = home_with_gauge();
    let merged = merge_all(&registry).expect("merged");

    let tags: Vec<_> = merged.unindexed.iter().map(type_tag).collect();
    assert_eq!(tags, vec!["rectangle", "circle"]);

    let circle = &merged.unindexed[1];
    assert_eq!(circle.transform, Transform::new(-5.0, -5.0, 0.5));
    assert_eq!(circle.clip, Some(ClipRegion::new(0.0, 0.0, 100.0, 100.0)));
    assert_eq!(merged.unindexed[0].transform, Transform::IDENTITY);
}

#[test]
fn first_writer_keeps_slot_placement_but_content_is_replaced() {
    let mut registry = home_with_gauge();
    registry.drawing_mut("home").expect("home").indexed.insert(
        7,
        Item::shape("label", payload(json!({"text": "home"})))
            .with_transform(Transform::new(10.0, 10.0, 1.0))
            .with_visible(true),
    );
    registry.drawing_mut("gauge").expect("gauge").indexed.insert(
        7,
        Item::shape("label", payload(json!({"text": "gauge"})))
            .with_transform(Transform::new(40.0, 40.0, 1.0))
            .with_visible(false),
    );

    let merged = merge_all(&registry).expect("merged");
    let slot = &merged.indexed[&7];
    assert_eq!(slot.transform, Transform::new(10.0, 10.0, 1.0));
    assert_eq!(slot.visible, Some(true));
    match &slot.kind {
        ItemKind::Shape { payload, .. } => assert_eq!(payload.get("text"), Some(&json!("gauge"))),
        other => panic!("unexpected item {other:?}"),
    }
}

#[test]
fn touch_zones_keep_first_placement_and_actions_keep_last_writer() {
    let mut registry = home_with_gauge();
    let home = registry.drawing_mut("home").expect("home");
    home.touch_zones.insert(
        "c1".to_string(),
        zone("c1", "home", Transform::new(1.0, 2.0, 1.0)),
    );
    home.touch_zones
        .insert(String::new(), zone("", "home", Transform::IDENTITY));
    home.touch_actions
        .insert("c1".to_string(), vec![json!({"from": "home"})]);
    let gauge = registry.drawing_mut("gauge").expect("gauge");
    let mut gauge_zone = zone("c1", "gauge", Transform::new(8.0, 8.0, 1.0));
    gauge_zone.filter = TouchFilter::Drag;
    gauge.touch_zones.insert("c1".to_string(), gauge_zone);
    gauge
        .touch_actions
        .insert("c1".to_string(), vec![json!({"from": "gauge"})]);

    let merged = merge_all(&registry).expect("merged");
    assert_eq!(merged.touch_zones.len(), 1);
    let c1 = &merged.touch_zones["c1"];
    assert_eq!(c1.transform, Transform::new(1.0, 2.0, 1.0));
    assert_eq!(c1.filter, TouchFilter::Drag);
    assert_eq!(merged.touch_actions["c1"], vec![json!({"from": "gauge"})]);
}

#[test]
fn hidden_and_unreceived_embeds_are_skipped() {
    let mut registry = home_with_gauge();
    registry.ensure_drawing("dial", Some("home"));
    let home = registry.drawing_mut("home").expect("home");
    home.unindexed[1] = Item::embed("gauge", 10.0, 10.0).with_visible(false);
    home.unindexed.push(Item::embed("dial", 0.0, 0.0));

    let merged = merge_all(&registry).expect("merged");
    let tags: Vec<_> = merged.unindexed.iter().map(type_tag).collect();
    assert_eq!(tags, vec!["rectangle"]);
}

#[test]
fn embed_cycles_terminate() {
    let mut registry = home_with_gauge();
    registry
        .drawing_mut("gauge")
        .expect("gauge")
        .unindexed
        .push(Item::embed("home", 0.0, 0.0));

    let merged = merge_all(&registry).expect("merged");
    let tags: Vec<_> = merged.unindexed.iter().map(type_tag).collect();
    assert_eq!(tags, vec!["rectangle", "circle"]);
}

#[test]
fn missing_dimensions_fall_back_to_default_size() {
    let mut registry = Registry::new();
    receive(&mut registry, "home", None, None);
    registry
        .drawing_mut("home")
        .expect("home")
        .unindexed
        .push(Item::shape("rectangle", Map::new()));

    let merged = merge_all(&registry).expect("merged");
    assert_eq!(
        merged.unindexed[0].clip,
        Some(ClipRegion::new(0.0, 0.0, FALLBACK_DRAWING_SIZE, FALLBACK_DRAWING_SIZE))
    );
}

#[test]
fn nothing_to_merge_before_primary_arrives() {
    let mut registry = Registry::new();
    assert!(merge_all(&registry).is_none());
    registry.ensure_drawing("home", None);
    assert!(merge_all(&registry).is_none());
}

#[test]
fn received_embed_without_size_is_skipped() {
    let mut registry = home_with_gauge();
    let gauge = registry.drawing_mut("gauge").expect("gauge");
    gauge.meta = None;

    let merged = merge_all(&registry).expect("merged");
    let tags: Vec<_> = merged.unindexed.iter().map(type_tag).collect();
    assert_eq!(tags, vec!["rectangle"]);
}
