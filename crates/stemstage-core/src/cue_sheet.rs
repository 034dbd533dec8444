//! Cue-sheet annotation parser
//!
//! Songs carry free-form performance notes. Lines starting with a timestamp
//! may embed device commands:
//!
//! ```text
//! [00:10] Verse 1, switch to clean [[PC:1:1]]
//! [01:02.5] Chorus [[CC:2:74:127]] [[NOTE:10:36:100]]
//! ```
//!
//! Tokens are stripped from the display text. Every command becomes one
//! [`TimedCue`] for the cue scheduler. Channels are written 1-16 and stored
//! 0-15; data bytes are raw 0-127.

use std::fmt;

use thiserror::Error;

use crate::engine::TimedCue;

/// A device command fired by the cue scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueCommand {
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    Note { channel: u8, note: u8, velocity: u8 },
}

impl CueCommand {
    /// Zero-based MIDI channel
    pub fn channel(&self) -> u8 {
        match *self {
            CueCommand::ProgramChange { channel, .. }
            | CueCommand::ControlChange { channel, .. }
            | CueCommand::Note { channel, .. } => channel,
        }
    }
}

impl fmt::Display for CueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CueCommand::ProgramChange { channel, program } => {
                write!(f, "PC ch{} program {}", channel + 1, program)
            }
            CueCommand::ControlChange { channel, controller, value } => {
                write!(f, "CC ch{} #{}={}", channel + 1, controller, value)
            }
            CueCommand::Note { channel, note, velocity } => {
                write!(f, "NOTE ch{} {} vel {}", channel + 1, note, velocity)
            }
        }
    }
}

/// Errors for a single malformed command token
#[derive(Debug, Error, PartialEq)]
pub enum CueSheetError {
    #[error("Unknown cue command: {0}")]
    UnknownCommand(String),

    #[error("{command} is missing argument {position}")]
    MissingArgument { command: &'static str, position: usize },

    #[error("Invalid number in cue token: {0}")]
    InvalidNumber(String),

    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: u32 },
}

/// One timestamped annotation line
#[derive(Debug, Clone, PartialEq)]
pub struct CueLine {
    pub timestamp: f64,
    /// Display text with timestamp and command tokens removed
    pub text: String,
    pub commands: Vec<CueCommand>,
}

/// All timestamped lines of an annotation, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueSheet {
    pub lines: Vec<CueLine>,
}

impl CueSheet {
    /// One cue per embedded command, sorted by timestamp
    pub fn timed_cues(&self) -> Vec<TimedCue> {
        let mut cues: Vec<TimedCue> = self
            .lines
            .iter()
            .flat_map(|line| {
                line.commands
                    .iter()
                    .map(move |cmd| TimedCue::new(line.timestamp, *cmd, line.text.clone()))
            })
            .collect();
        cues.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        cues
    }
}

/// Parse an annotation text
///
/// Lines without a leading timestamp are ignored. Malformed tokens are
/// logged and skipped without dropping the rest of the line.
pub fn parse_cue_sheet(text: &str) -> CueSheet {
    let lines = text
        .lines()
        .enumerate()
        .filter_map(|(index, line)| parse_line(line, index + 1))
        .collect();
    CueSheet { lines }
}

fn parse_line(line: &str, line_number: usize) -> Option<CueLine> {
    let line = line.trim();
    let rest = line.strip_prefix('[')?;
    if rest.starts_with('[') {
        return None;
    }
    let close = rest.find(']')?;
    let timestamp = parse_timestamp(&rest[..close])?;
    let body = &rest[close + 1..];

    let mut text = String::with_capacity(body.len());
    let mut commands = Vec::new();
    let mut remaining = body;

    while let Some(open) = remaining.find("[[") {
        text.push_str(&remaining[..open]);
        let after_open = &remaining[open + 2..];
        let Some(end) = after_open.find("]]") else {
            // Unterminated token: keep it as text
            text.push_str(&remaining[open..]);
            remaining = "";
            break;
        };
        match parse_command(&after_open[..end]) {
            Ok(cmd) => commands.push(cmd),
            Err(e) => log::warn!("Cue sheet line {}: {}", line_number, e),
        }
        remaining = &after_open[end + 2..];
    }
    text.push_str(remaining);

    Some(CueLine {
        timestamp,
        text: text.split_whitespace().collect::<Vec<_>>().join(" "),
        commands,
    })
}

/// Parse `MM:SS`, `MM:SS.frac` or `H:MM:SS` into seconds
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    if !(0.0..60.0).contains(&seconds) || (parts.len() == 3 && minutes >= 60) {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// Parse the inside of a `[[...]]` token
pub fn parse_command(token: &str) -> Result<CueCommand, CueSheetError> {
    let mut parts = token.split(':').map(str::trim);
    let name = parts.next().unwrap_or_default().to_ascii_uppercase();
    let args: Vec<&str> = parts.collect();

    match name.as_str() {
        "PC" | "PROGRAM" => Ok(CueCommand::ProgramChange {
            channel: channel_arg(&args, "PC")?,
            program: data_arg(&args, 1, "PC", "program")?,
        }),
        "CC" | "CONTROL" => Ok(CueCommand::ControlChange {
            channel: channel_arg(&args, "CC")?,
            controller: data_arg(&args, 1, "CC", "controller")?,
            value: data_arg(&args, 2, "CC", "value")?,
        }),
        "NOTE" => Ok(CueCommand::Note {
            channel: channel_arg(&args, "NOTE")?,
            note: data_arg(&args, 1, "NOTE", "note")?,
            velocity: if args.len() > 2 {
                data_arg(&args, 2, "NOTE", "velocity")?
            } else {
                127
            },
        }),
        _ => Err(CueSheetError::UnknownCommand(name)),
    }
}

fn number_arg(args: &[&str], position: usize, command: &'static str) -> Result<u32, CueSheetError> {
    let raw = args
        .get(position)
        .filter(|s| !s.is_empty())
        .ok_or(CueSheetError::MissingArgument { command, position: position + 1 })?;
    raw.parse()
        .map_err(|_| CueSheetError::InvalidNumber((*raw).to_string()))
}

fn channel_arg(args: &[&str], command: &'static str) -> Result<u8, CueSheetError> {
    let channel = number_arg(args, 0, command)?;
    if !(1..=16).contains(&channel) {
        return Err(CueSheetError::OutOfRange { what: "channel", value: channel });
    }
    Ok((channel - 1) as u8)
}

fn data_arg(
    args: &[&str],
    position: usize,
    command: &'static str,
    what: &'static str,
) -> Result<u8, CueSheetError> {
    let value = number_arg(args, position, command)?;
    if value > 127 {
        return Err(CueSheetError::OutOfRange { what, value });
    }
    Ok(value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_change_line() {
        let sheet = parse_cue_sheet("[00:10] Verse one [[PC:1:1]]");
        assert_eq!(sheet.lines.len(), 1);
        let line = &sheet.lines[0];
        assert_eq!(line.timestamp, 10.0);
        assert_eq!(line.text, "Verse one");
        assert_eq!(
            line.commands,
            vec![CueCommand::ProgramChange { channel: 0, program: 1 }]
        );
    }

    #[test]
    fn test_multiple_tokens_and_text_between() {
        let sheet = parse_cue_sheet("[1:02.5] Chorus [[cc:2:74:127]] big [[NOTE:10:36]] end");
        let line = &sheet.lines[0];
        assert_eq!(line.timestamp, 62.5);
        assert_eq!(line.text, "Chorus big end");
        assert_eq!(
            line.commands,
            vec![
                CueCommand::ControlChange { channel: 1, controller: 74, value: 127 },
                CueCommand::Note { channel: 9, note: 36, velocity: 127 },
            ]
        );
    }

    #[test]
    fn test_lines_without_timestamp_are_ignored() {
        let sheet = parse_cue_sheet("Intro notes\n[[PC:1:2]] no time\n\n[00:05] go");
        assert_eq!(sheet.lines.len(), 1);
        assert_eq!(sheet.lines[0].timestamp, 5.0);
        assert!(sheet.lines[0].commands.is_empty());
    }

    #[test]
    fn test_malformed_token_is_skipped() {
        let sheet = parse_cue_sheet("[00:30] Bridge [[PC:17:1]] [[XX:1]] [[PC:3:4]]");
        let line = &sheet.lines[0];
        assert_eq!(line.text, "Bridge");
        assert_eq!(
            line.commands,
            vec![CueCommand::ProgramChange { channel: 2, program: 4 }]
        );
    }

    #[test]
    fn test_command_errors() {
        assert_eq!(
            parse_command("CC:1:7"),
            Err(CueSheetError::MissingArgument { command: "CC", position: 3 })
        );
        assert_eq!(
            parse_command("PC:1:200"),
            Err(CueSheetError::OutOfRange { what: "program", value: 200 })
        );
        assert_eq!(
            parse_command("PC:one:1"),
            Err(CueSheetError::InvalidNumber("one".to_string()))
        );
        assert!(matches!(parse_command("SYSEX:1"), Err(CueSheetError::UnknownCommand(_))));
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamp("00:00"), Some(0.0));
        assert_eq!(parse_timestamp("3:07"), Some(187.0));
        assert_eq!(parse_timestamp("1:00:01"), Some(3601.0));
        assert_eq!(parse_timestamp("00:75"), None);
        assert_eq!(parse_timestamp("abc"), None);
    }

    #[test]
    fn test_timed_cues_sorted_one_per_command() {
        let sheet = parse_cue_sheet(
            "[00:20] B [[PC:1:2]]\n[00:10] A [[PC:1:1]] [[CC:1:1:64]]",
        );
        let cues = sheet.timed_cues();
        let times: Vec<f64> = cues.iter().map(|c| c.timestamp).collect();
        assert_eq!(times, vec![10.0, 10.0, 20.0]);
        assert!(cues.iter().all(|c| !c.is_fired()));
        assert_eq!(cues[2].label, "B");
    }
}
