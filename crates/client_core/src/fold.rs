use shared::{
    error::FailureKind,
    protocol::{ServerMessage, WireItem, WireTouchZone, ERASE, HIDE, INSERT_DWG, UNHIDE},
};
use tracing::{debug, warn};

use crate::registry::{Drawing, DrawingMeta, Item, Registry, TouchActionInput, TouchZone};

#[derive(Debug, Default, PartialEq)]
pub struct FoldOutcome {
    /// Drawings embedded by the message's items, in order, deduplicated.
    pub embeds: Vec<String>,
    /// The server answered with an empty drawing.
    pub not_found: bool,
}

fn item_from_wire(wire: &WireItem) -> Item {
    let item = if wire.kind == INSERT_DWG {
        Item::embed(
            wire.drawing_name.clone().unwrap_or_default(),
            wire.x_offset.unwrap_or(0.0),
            wire.y_offset.unwrap_or(0.0),
        )
    } else {
        Item::shape(wire.kind.clone(), wire.payload.clone())
    };
    Item {
        transform: wire.transform.unwrap_or_default(),
        visible: wire.visible,
        ..item
    }
}

enum SlotEdit {
    Erase,
    Visibility(bool),
    Put(Item),
}

fn slot_edit(wire: &WireItem) -> SlotEdit {
    match wire.kind.as_str() {
        ERASE => SlotEdit::Erase,
        HIDE => SlotEdit::Visibility(false),
        UNHIDE => SlotEdit::Visibility(true),
        _ => SlotEdit::Put(item_from_wire(wire)),
    }
}

fn is_slot_command(wire: &WireItem) -> bool {
    matches!(wire.kind.as_str(), ERASE | HIDE | UNHIDE)
}

fn zone_from_wire(drawing_name: &str, wire: &WireTouchZone) -> TouchZone {
    TouchZone {
        cmd: wire.cmd.clone(),
        filter: wire.filter,
        transform: wire.transform.unwrap_or_default(),
        clip: None,
        parent_drawing: drawing_name.to_string(),
        payload: wire.payload.clone(),
    }
}

fn apply_meta(drawing: &mut Drawing, message: &ServerMessage) {
    let meta = drawing.meta.get_or_insert_with(DrawingMeta::default);
    if message.x.is_some() {
        meta.width = message.x;
    }
    if message.y.is_some() {
        meta.height = message.y;
    }
    if message.color.is_some() {
        meta.color = message.color.clone();
    }
    if let Some(refresh) = message.refresh {
        meta.refresh_ms = refresh;
    }
}

/// Embed targets named by `items`, in order and deduplicated. Embeds of the
/// drawing itself or of the primary drawing are dropped.
fn discover_embeds(items: &[Item], drawing_name: &str, primary: Option<&str>) -> Vec<String> {
    let mut embeds: Vec<String> = Vec::new();
    for embedding in items.iter().filter_map(Item::as_embedding) {
        let target = embedding.drawing_name.trim();
        if target.is_empty() {
            warn!(drawing = drawing_name, "embed item has no drawing name");
            continue;
        }
        if target == drawing_name || primary == Some(target) {
            warn!(drawing = drawing_name, target, "ignoring embed of the primary drawing or itself");
            continue;
        }
        if !embeds.iter().any(|known| known == target) {
            embeds.push(target.to_string());
        }
    }
    embeds
}

/// Folds a drawing response into `registry`. A full message (`update` false)
/// replaces the drawing's content; an update edits it in place and only
/// replaces the unindexed list when it carries unindexed items.
pub fn fold_drawing(registry: &mut Registry, drawing_name: &str, message: &ServerMessage) -> FoldOutcome {
    let primary = registry.primary_name().map(str::to_string);
    let drawing = registry.ensure_drawing(drawing_name, None);

    if message.is_empty_drawing() {
        warn!(drawing = drawing_name, "server does not know this drawing");
        drawing.received = true;
        return FoldOutcome {
            not_found: true,
            ..FoldOutcome::default()
        };
    }

    if !message.update {
        drawing.clear_content();
    }
    apply_meta(drawing, message);
    drawing.received = true;
    if message.version.is_some() {
        drawing.version = message.version.clone();
    }

    let mut unindexed = Vec::new();
    for wire in &message.items {
        match wire.idx {
            Some(slot) => match slot_edit(wire) {
                SlotEdit::Erase => {
                    drawing.indexed.remove(&slot);
                }
                SlotEdit::Visibility(visible) => match drawing.indexed.get_mut(&slot) {
                    Some(item) => item.visible = Some(visible),
                    None => debug!(drawing = drawing_name, slot, "visibility change for empty slot"),
                },
                SlotEdit::Put(item) => {
                    drawing.indexed.insert(slot, item);
                }
            },
            None if is_slot_command(wire) => {
                warn!(drawing = drawing_name, kind = %wire.kind, "slot command without idx ignored");
            }
            None => unindexed.push(item_from_wire(wire)),
        }
    }
    let embeds = discover_embeds(&unindexed, drawing_name, primary.as_deref());
    if !message.update || !unindexed.is_empty() {
        drawing.unindexed = unindexed;
    }

    for wire in &message.touch_zones {
        if wire.cmd.trim().is_empty() {
            warn!(
                drawing = drawing_name,
                kind = ?FailureKind::MalformedTouchZone,
                "dropping touch zone with empty cmd"
            );
            continue;
        }
        drawing
            .touch_zones
            .insert(wire.cmd.clone(), zone_from_wire(drawing_name, wire));
    }
    for wire in &message.touch_actions {
        drawing
            .touch_actions
            .insert(wire.cmd.clone(), wire.actions.clone());
    }
    for wire in &message.touch_action_inputs {
        drawing.touch_action_inputs.insert(
            wire.cmd.clone(),
            TouchActionInput {
                cmd: wire.cmd.clone(),
                payload: wire.payload.clone(),
            },
        );
    }

    for target in &embeds {
        registry.ensure_drawing(target, Some(drawing_name));
    }
    FoldOutcome {
        embeds,
        not_found: false,
    }
}

/// Patches a touch response into the drawing it came from and straight into
/// the merged collections, without a full re-merge. Slots and zones keep
/// their merged placement; only content changes.
pub fn fold_touch(registry: &mut Registry, drawing_name: Option<&str>, message: &ServerMessage) {
    if let Some(name) = drawing_name {
        if let Some(drawing) = registry.drawing_mut(name) {
            if message.version.is_some() {
                drawing.version = message.version.clone();
            }
            for wire in message.items.iter().filter(|wire| wire.idx.is_some()) {
                let Some(slot) = wire.idx else { continue };
                match slot_edit(wire) {
                    SlotEdit::Erase => {
                        drawing.indexed.remove(&slot);
                    }
                    SlotEdit::Visibility(visible) => {
                        if let Some(item) = drawing.indexed.get_mut(&slot) {
                            item.visible = Some(visible);
                        }
                    }
                    SlotEdit::Put(item) => {
                        drawing.indexed.insert(slot, item);
                    }
                }
            }
            for wire in message.touch_zones.iter().filter(|wire| !wire.cmd.trim().is_empty()) {
                drawing
                    .touch_zones
                    .insert(wire.cmd.clone(), zone_from_wire(name, wire));
            }
            for wire in &message.touch_actions {
                drawing
                    .touch_actions
                    .insert(wire.cmd.clone(), wire.actions.clone());
            }
        } else {
            debug!(drawing = name, "touch response for unknown drawing");
        }
    }

    let unindexed = message.items.iter().filter(|wire| wire.idx.is_none()).count();
    if unindexed > 0 {
        debug!(count = unindexed, "touch response carried unindexed items; ignored");
    }

    let merged = registry.merged_mut();
    for wire in &message.items {
        let Some(slot) = wire.idx else { continue };
        match slot_edit(wire) {
            SlotEdit::Erase => {
                merged.indexed.remove(&slot);
            }
            SlotEdit::Visibility(visible) => {
                if let Some(item) = merged.indexed.get_mut(&slot) {
                    item.visible = Some(visible);
                }
            }
            SlotEdit::Put(item) => match merged.indexed.get_mut(&slot) {
                Some(existing) => {
                    existing.kind = item.kind;
                    if item.visible.is_some() {
                        existing.visible = item.visible;
                    }
                }
                None => debug!(slot, "touch update for unplaced slot waits for next merge"),
            },
        }
    }
    for wire in &message.touch_zones {
        match merged.touch_zones.get_mut(&wire.cmd) {
            Some(existing) => {
                existing.filter = wire.filter;
                existing.payload = wire.payload.clone();
            }
            None => debug!(cmd = %wire.cmd, "touch update for unplaced zone waits for next merge"),
        }
    }
    for wire in &message.touch_actions {
        merged
            .touch_actions
            .insert(wire.cmd.clone(), wire.actions.clone());
    }
    for wire in message.touch_action_inputs.iter().filter(|wire| !wire.cmd.is_empty()) {
        merged.touch_action_inputs.insert(
            wire.cmd.clone(),
            TouchActionInput {
                cmd: wire.cmd.clone(),
                payload: wire.payload.clone(),
            },
        );
    }
}

#[cfg(test)]
#[path = "tests/fold_tests.rs"]
mod tests;
