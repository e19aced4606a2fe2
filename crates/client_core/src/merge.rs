use std::collections::HashSet;

use shared::{
    domain::{ClipRegion, Transform},
    error::FailureKind,
};
use tracing::{debug, warn};

use crate::{
    registry::{Embedding, Item, MergedCollections, Registry},
    transform::{embedded_clip, embedded_content_transform, primary_clip, FALLBACK_DRAWING_SIZE},
};

/// Where a drawing's content lands in the merged space.
struct Placement<'a> {
    drawing: &'a str,
    transform: Transform,
    x_offset: f64,
    y_offset: f64,
}

struct Merger<'a> {
    registry: &'a Registry,
    visited: HashSet<&'a str>,
    out: MergedCollections,
}

/// Flattens the primary drawing and everything it embeds into one set of
/// collections. Returns `None` until the primary drawing has been received.
///
/// The registry is only read, so merging the same registry twice yields the
/// same collections.
pub fn merge_all(registry: &Registry) -> Option<MergedCollections> {
    let primary = registry.primary()?;
    if !registry.has_received(&primary.name) {
        debug!(drawing = %primary.name, "primary drawing not received yet; skipping merge");
        return None;
    }
    let meta = primary.meta.as_ref()?;
    let width = meta.width.unwrap_or(FALLBACK_DRAWING_SIZE);
    let height = meta.height.unwrap_or(FALLBACK_DRAWING_SIZE);

    let mut merger = Merger {
        registry,
        visited: HashSet::from([primary.name.as_str()]),
        out: MergedCollections::default(),
    };
    merger.merge_drawing(
        Placement {
            drawing: &primary.name,
            transform: Transform::IDENTITY,
            x_offset: 0.0,
            y_offset: 0.0,
        },
        primary_clip(width, height),
    );
    Some(merger.out)
}

impl<'a> Merger<'a> {
    fn merge_drawing(&mut self, placement: Placement<'a>, parent_clip: ClipRegion) {
        let registry = self.registry;
        let Some(drawing) = registry.drawing(placement.drawing) else {
            warn!(drawing = placement.drawing, "drawing missing from registry during merge");
            return;
        };
        let Some(meta) = drawing.meta.as_ref() else {
            warn!(drawing = placement.drawing, "drawing has no data during merge");
            return;
        };
        let width = meta.width.unwrap_or(FALLBACK_DRAWING_SIZE);
        let content = embedded_content_transform(
            placement.transform,
            width,
            parent_clip,
            placement.x_offset,
            placement.y_offset,
        );
        let clip = embedded_clip(parent_clip);

        for zone in drawing.touch_zones.values() {
            if zone.cmd.trim().is_empty() {
                warn!(
                    drawing = %drawing.name,
                    kind = ?FailureKind::MalformedTouchZone,
                    "dropping touch zone with empty cmd"
                );
                continue;
            }
            let mut merged = zone.clone();
            merged.transform = zone.transform.compose(content);
            merged.clip = Some(clip);
            if let Some(existing) = self.out.touch_zones.get(&zone.cmd) {
                if existing.parent_drawing != zone.parent_drawing {
                    warn!(
                        cmd = %zone.cmd,
                        first = %existing.parent_drawing,
                        second = %zone.parent_drawing,
                        "touch zone cmd declared by two drawings; keeping first placement"
                    );
                }
                merged.transform = existing.transform;
                merged.clip = existing.clip;
            }
            self.out.touch_zones.insert(zone.cmd.clone(), merged);
        }

        for (cmd, actions) in &drawing.touch_actions {
            if actions.is_empty() {
                continue;
            }
            self.out.touch_actions.insert(cmd.clone(), actions.clone());
        }
        for (cmd, input) in &drawing.touch_action_inputs {
            self.out.touch_action_inputs.insert(cmd.clone(), input.clone());
        }

        for item in &drawing.unindexed {
            match item.as_embedding() {
                Some(embedding) => self.merge_embedding(item, embedding, content, clip),
                None => {
                    let mut merged = item.clone();
                    merged.transform = item.transform.compose(content);
                    merged.clip = Some(clip);
                    self.out.unindexed.push(merged);
                }
            }
        }

        for (slot, item) in &drawing.indexed {
            let mut merged = item.clone();
            merged.transform = item.transform.compose(content);
            merged.clip = Some(clip);
            if let Some(existing) = self.out.indexed.get(slot) {
                merged.transform = existing.transform;
                merged.clip = existing.clip;
                merged.visible = existing.visible;
            }
            self.out.indexed.insert(*slot, merged);
        }
    }

    fn merge_embedding(
        &mut self,
        item: &'a Item,
        embedding: &'a Embedding,
        parent_content: Transform,
        clip: ClipRegion,
    ) {
        let target = embedding.drawing_name.as_str();
        if !item.is_visible() {
            debug!(drawing = target, "skipping hidden embed");
            return;
        }
        if target.is_empty() {
            warn!(kind = ?FailureKind::MissingEmbed, "embed item has no drawing name");
            return;
        }
        let Some(drawing) = self.registry.drawing(target).filter(|drawing| drawing.received) else {
            warn!(
                drawing = target,
                kind = ?FailureKind::MissingEmbed,
                "no response received for embedded drawing yet"
            );
            return;
        };
        if drawing.meta.is_none() {
            warn!(
                drawing = target,
                kind = ?FailureKind::MissingEmbed,
                "embedded drawing was received but declares no size"
            );
            return;
        }
        if !self.visited.insert(target) {
            debug!(drawing = target, "embedded drawing already merged");
            return;
        }
        self.merge_drawing(
            Placement {
                drawing: target,
                transform: item.transform.compose(parent_content),
                x_offset: embedding.x_offset,
                y_offset: embedding.y_offset,
            },
            clip,
        );
    }
}

#[cfg(test)]
#[path = "tests/merge_tests.rs"]
mod tests;
