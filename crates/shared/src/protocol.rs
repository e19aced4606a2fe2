use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{TouchFilter, Transform};

/// Item type tag that embeds another drawing.
pub const INSERT_DWG: &str = "insertDwg";
pub const ERASE: &str = "erase";
pub const HIDE: &str = "hide";
pub const UNHIDE: &str = "unhide";

/// Directive sent on start-up; the server answers with its main menu.
pub const START_DIRECTIVE: &str = "{.}";
/// Reply the server sends for a drawing it does not know.
pub const EMPTY_CMD: &str = "{}";

const MENU_PREFIXES: [&str; 2] = ["{,", "{;"];

/// Any message returned by the drawing endpoint. Menu messages only carry
/// `cmd` (and possibly `version`); drawing messages carry the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<u64>,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub items: Vec<WireItem>,
    #[serde(default)]
    pub touch_zones: Vec<WireTouchZone>,
    #[serde(default)]
    pub touch_actions: Vec<WireTouchAction>,
    #[serde(default)]
    pub touch_action_inputs: Vec<WireTouchActionInput>,
}

impl ServerMessage {
    pub fn is_menu(&self) -> bool {
        is_menu_cmd(&self.cmd)
    }

    pub fn is_empty_drawing(&self) -> bool {
        self.cmd.trim() == EMPTY_CMD
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawing_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_offset: Option<f64>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTouchZone {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub filter: TouchFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireTouchAction {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub actions: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireTouchActionInput {
    #[serde(default)]
    pub cmd: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// What a menu translator made of a menu `cmd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MenuResult {
    Menu {
        drawing_name: String,
        identifier: String,
    },
    Error {
        message: String,
    },
}

pub fn is_menu_cmd(cmd: &str) -> bool {
    MENU_PREFIXES.iter().any(|prefix| cmd.starts_with(prefix))
}

/// `{name}`, or `{version:name}` when a version token is known.
pub fn drawing_directive(drawing_name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{{{version}:{drawing_name}}}"),
        None => format!("{{{drawing_name}}}"),
    }
}

pub fn touch_directive(identifier: &str, cmd: &str, col: i64, row: i64) -> String {
    format!("{{{identifier}~{cmd}`{col}`{row}}}")
}
