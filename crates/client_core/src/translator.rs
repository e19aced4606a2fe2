use shared::protocol::{is_menu_cmd, MenuResult};

/// Turns a menu `cmd` into the drawing it points at.
pub trait MenuTranslator: Send + Sync {
    fn translate(&self, cmd: &str) -> MenuResult;
}

/// Reads the first `|+` item of a pfod menu: `identifier~drawingName`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfodMenuTranslator;

impl MenuTranslator for PfodMenuTranslator {
    fn translate(&self, cmd: &str) -> MenuResult {
        let cmd = cmd.trim();
        if !is_menu_cmd(cmd) {
            return MenuResult::Error {
                message: format!("not a menu: {cmd}"),
            };
        }
        let body = cmd.strip_suffix('}').unwrap_or(cmd);
        let Some(start) = body.find("|+") else {
            return MenuResult::Error {
                message: "menu has no drawing item".to_string(),
            };
        };
        let item = body[start + 2..].split('|').next().unwrap_or_default();
        let (identifier, drawing_name) = item.split_once('~').unwrap_or((item, ""));
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return MenuResult::Error {
                message: "menu drawing item has no identifier".to_string(),
            };
        }
        MenuResult::Menu {
            drawing_name: drawing_name.trim().to_string(),
            identifier: identifier.to_string(),
        }
    }
}

pub struct MissingMenuTranslator;

impl MenuTranslator for MissingMenuTranslator {
    fn translate(&self, _cmd: &str) -> MenuResult {
        MenuResult::Error {
            message: "menu translation is unavailable".to_string(),
        }
    }
}
