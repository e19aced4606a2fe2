use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};
use shared::domain::{ClipRegion, TouchFilter, Transform};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    pub drawing_name: String,
    pub x_offset: f64,
    pub y_offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Embed(Embedding),
    /// Any other drawable; the payload is carried through untouched.
    Shape {
        type_tag: String,
        payload: Map<String, Value>,
    },
}

/// A drawable item plus the placement fields the merge engine owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub kind: ItemKind,
    pub transform: Transform,
    pub clip: Option<ClipRegion>,
    pub visible: Option<bool>,
}

impl Item {
    pub fn shape(type_tag: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            kind: ItemKind::Shape {
                type_tag: type_tag.into(),
                payload,
            },
            transform: Transform::IDENTITY,
            clip: None,
            visible: None,
        }
    }

    pub fn embed(drawing_name: impl Into<String>, x_offset: f64, y_offset: f64) -> Self {
        Self {
            kind: ItemKind::Embed(Embedding {
                drawing_name: drawing_name.into(),
                x_offset,
                y_offset,
            }),
            transform: Transform::IDENTITY,
            clip: None,
            visible: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn as_embedding(&self) -> Option<&Embedding> {
        match &self.kind {
            ItemKind::Embed(embedding) => Some(embedding),
            ItemKind::Shape { .. } => None,
        }
    }

    /// Only an explicit `false` hides an item.
    pub fn is_visible(&self) -> bool {
        self.visible != Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TouchZone {
    pub cmd: String,
    pub filter: TouchFilter,
    pub transform: Transform,
    pub clip: Option<ClipRegion>,
    /// Drawing that declared the zone.
    pub parent_drawing: String,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TouchActionInput {
    pub cmd: String,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawingMeta {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub color: Option<String>,
    /// Auto-refresh interval; zero disables refresh.
    pub refresh_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Drawing {
    pub name: String,
    pub parent: Option<String>,
    pub meta: Option<DrawingMeta>,
    pub received: bool,
    pub version: Option<String>,
    pub unindexed: Vec<Item>,
    pub indexed: BTreeMap<u32, Item>,
    pub touch_zones: BTreeMap<String, TouchZone>,
    pub touch_actions: BTreeMap<String, Vec<Value>>,
    pub touch_action_inputs: BTreeMap<String, TouchActionInput>,
}

impl Drawing {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn clear_content(&mut self) {
        self.unindexed.clear();
        self.indexed.clear();
        self.touch_zones.clear();
        self.touch_actions.clear();
        self.touch_action_inputs.clear();
    }
}

/// Output of a full merge: everything the renderer and hit-tester consume.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedCollections {
    pub unindexed: Vec<Item>,
    pub indexed: BTreeMap<u32, Item>,
    pub touch_zones: BTreeMap<String, TouchZone>,
    pub touch_actions: BTreeMap<String, Vec<Value>>,
    pub touch_action_inputs: BTreeMap<String, TouchActionInput>,
}

/// Every known drawing plus the merged view built from them. The first
/// entry of `order` is the primary drawing.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    order: Vec<String>,
    drawings: HashMap<String, Drawing>,
    merged: MergedCollections,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    pub fn primary(&self) -> Option<&Drawing> {
        self.primary_name().and_then(|name| self.drawings.get(name))
    }

    pub fn drawing(&self, name: &str) -> Option<&Drawing> {
        self.drawings.get(name)
    }

    pub fn drawing_mut(&mut self, name: &str) -> Option<&mut Drawing> {
        self.drawings.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_received(&self, name: &str) -> bool {
        self.drawings
            .get(name)
            .is_some_and(|drawing| drawing.received && drawing.meta.is_some())
    }

    /// Returns the named drawing, creating an empty one when first referenced.
    /// A parent is recorded only if none is known yet.
    pub fn ensure_drawing(&mut self, name: &str, parent: Option<&str>) -> &mut Drawing {
        if !self.drawings.contains_key(name) {
            self.order.push(name.to_string());
        }
        let drawing = self
            .drawings
            .entry(name.to_string())
            .or_insert_with(|| Drawing::new(name));
        if drawing.parent.is_none() {
            drawing.parent = parent.map(str::to_string);
        }
        drawing
    }

    /// Makes `name` the primary drawing, creating it if needed.
    pub fn set_primary(&mut self, name: &str) {
        self.ensure_drawing(name, None).parent = None;
        if let Some(position) = self.order.iter().position(|entry| entry == name) {
            let entry = self.order.remove(position);
            self.order.insert(0, entry);
        }
    }

    pub fn children_of(&self, name: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|entry| {
                self.drawings
                    .get(entry.as_str())
                    .and_then(|drawing| drawing.parent.as_deref())
                    == Some(name)
            })
            .cloned()
            .collect()
    }

    /// Removes `name` and, depth first, every drawing it inserted. Returns the
    /// removed names, descendants before their parents.
    pub fn remove_drawing(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        let mut stack = vec![(name.to_string(), false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                if self.drawings.remove(&current).is_some() {
                    self.order.retain(|entry| entry != &current);
                    removed.push(current);
                }
                continue;
            }
            if removed.contains(&current) || !self.drawings.contains_key(&current) {
                continue;
            }
            let children = self.children_of(&current);
            stack.push((current, true));
            for child in children {
                if !stack.iter().any(|(queued, _)| queued == &child) {
                    stack.push((child, false));
                }
            }
        }
        removed
    }

    pub fn merged(&self) -> &MergedCollections {
        &self.merged
    }

    pub fn merged_mut(&mut self) -> &mut MergedCollections {
        &mut self.merged
    }

    pub fn set_merged(&mut self, merged: MergedCollections) {
        self.merged = merged;
    }
}
