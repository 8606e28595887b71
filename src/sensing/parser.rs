use anyhow::{anyhow, bail, Context, Result};

use crate::models::Sample;

/// Operator commands that can be interleaved with samples, written as `!name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    TogglePause,
    Start,
    Stop,
    Toggle,
    Reload,
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Sample(Sample),
    Control(ControlCommand),
    /// Blank line or `#` comment.
    Skip,
}

/// Parse one line of sample input: `x,y,z` (commas and/or whitespace),
/// a `!command`, a blank line or a `#` comment.
pub fn parse_line(line: &str) -> Result<InputLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(InputLine::Skip);
    }

    if let Some(command) = line.strip_prefix('!') {
        return parse_command(command.trim()).map(InputLine::Control);
    }

    let fields: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .collect();
    if fields.len() != 3 {
        bail!("expected 3 axis values, got {}", fields.len());
    }

    let mut axes = [0.0f64; 3];
    for (axis, field) in axes.iter_mut().zip(&fields) {
        *axis = field
            .parse()
            .with_context(|| format!("invalid axis value '{field}'"))?;
    }

    Ok(InputLine::Sample(Sample::from(axes)))
}

fn parse_command(command: &str) -> Result<ControlCommand> {
    match command.to_ascii_lowercase().as_str() {
        "pause" => Ok(ControlCommand::Pause),
        "resume" => Ok(ControlCommand::Resume),
        "toggle-pause" => Ok(ControlCommand::TogglePause),
        "start" => Ok(ControlCommand::Start),
        "stop" => Ok(ControlCommand::Stop),
        "toggle" => Ok(ControlCommand::Toggle),
        "reload" => Ok(ControlCommand::Reload),
        "status" => Ok(ControlCommand::Status),
        other => Err(anyhow!("unknown control command '!{other}'")),
    }
}
