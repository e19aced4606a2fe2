use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(RequestId);

/// Translate plus uniform scale. Child coordinates are scaled first and then
/// offset by the parent's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        x: 0.0,
        y: 0.0,
        scale: 1.0,
    };

    pub fn new(x: f64, y: f64, scale: f64) -> Self {
        Self { x, y, scale }
    }

    /// Places `self` (expressed in the parent's local space) into the space
    /// `parent` maps to: `(cx*ps + px, cy*ps + py, cs*ps)`.
    pub fn compose(self, parent: Transform) -> Transform {
        Transform {
            x: self.x * parent.scale + parent.x,
            y: self.y * parent.scale + parent.y,
            scale: self.scale * parent.scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClipRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Which pointer interactions a touch zone reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TouchFilter {
    #[default]
    Touch,
    Down,
    Drag,
    Up,
    Click,
    Press,
    Entry,
    Exit,
    DownUp,
}

impl TouchFilter {
    pub fn is_drag(self) -> bool {
        self == TouchFilter::Drag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parent_leaves_child_unchanged() {
        let child = Transform::new(12.5, -3.0, 0.25);
        assert_eq!(child.compose(Transform::IDENTITY), child);
        assert_eq!(Transform::IDENTITY.compose(child), child);
    }

    #[test]
    fn compose_scales_child_then_offsets_by_parent() {
        let child = Transform::new(4.0, 6.0, 0.5);
        let parent = Transform::new(10.0, 20.0, 2.0);
        assert_eq!(child.compose(parent), Transform::new(18.0, 32.0, 1.0));
    }

    #[test]
    fn missing_transform_fields_default_to_identity() {
        let parsed: Transform = serde_json::from_str(r#"{"x": 3}"#).expect("parse");
        assert_eq!(parsed, Transform::new(3.0, 0.0, 1.0));
    }
}
