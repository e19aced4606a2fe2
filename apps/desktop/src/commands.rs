use anyhow::{anyhow, bail, Context, Result};
use client_core::{TouchRequest, ViewerCommand};
use shared::domain::TouchFilter;

/// Parses one line of the stdin control surface. Blank lines yield `None`.
///
/// ```text
/// start | reload | down | up | quit
/// touch <drawing> <cmd> <col> <row> [filter]
/// remove <drawing>
/// resize <width> <height>
/// ```
pub fn parse_command(line: &str) -> Result<Option<ViewerCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let mut next = |what: &str| {
        words
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("missing {what}"))
    };
    let command = match verb {
        "start" => ViewerCommand::Start,
        "reload" => ViewerCommand::Reload,
        "down" => ViewerCommand::PointerDown,
        "up" => ViewerCommand::PointerUp,
        "quit" | "exit" => ViewerCommand::Shutdown,
        "remove" => ViewerCommand::RemoveDrawing(next("drawing name")?),
        "resize" => ViewerCommand::Resize {
            width: next("width")?.parse().context("width must be a number")?,
            height: next("height")?.parse().context("height must be a number")?,
        },
        "touch" => {
            let drawing_name = next("drawing name")?;
            let cmd = next("touch cmd")?;
            let col = next("col")?.parse().context("col must be an integer")?;
            let row = next("row")?.parse().context("row must be an integer")?;
            let filter = match next("filter") {
                Ok(raw) => parse_filter(&raw)?,
                Err(_) => TouchFilter::default(),
            };
            ViewerCommand::Touch(TouchRequest {
                drawing_name,
                cmd,
                filter,
                col,
                row,
            })
        }
        other => bail!("unknown command '{other}'"),
    };
    Ok(Some(command))
}

fn parse_filter(raw: &str) -> Result<TouchFilter> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .with_context(|| format!("unknown touch filter '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_verbs() {
        assert_eq!(parse_command("  ").expect("blank"), None);
        assert_eq!(parse_command("reload").expect("reload"), Some(ViewerCommand::Reload));
        assert_eq!(parse_command("quit").expect("quit"), Some(ViewerCommand::Shutdown));
        assert_eq!(
            parse_command("resize 800 600").expect("resize"),
            Some(ViewerCommand::Resize {
                width: 800,
                height: 600
            })
        );
    }

    #[test]
    fn parses_touch_with_optional_filter() {
        assert_eq!(
            parse_command("touch home c1 4 9 drag").expect("touch"),
            Some(ViewerCommand::Touch(TouchRequest {
                drawing_name: "home".into(),
                cmd: "c1".into(),
                filter: TouchFilter::Drag,
                col: 4,
                row: 9,
            }))
        );
        match parse_command("touch home c2 1 1").expect("touch") {
            Some(ViewerCommand::Touch(touch)) => assert_eq!(touch.filter, TouchFilter::Touch),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("touch home c1 x 1").is_err());
        assert!(parse_command("remove").is_err());
        assert!(parse_command("touch home c1 1 1 sideways").is_err());
        assert!(parse_command("fly").is_err());
    }
}
