//! Line-oriented performance console
//!
//! One command per line on stdin. Parsing and formatting are pure so they
//! can be tested without an audio device; `main` does the I/O.

use std::fmt::Write as _;

use stemstage_core::cue_sheet::parse_timestamp;
use stemstage_core::engine::{LevelsSnapshot, MeterReading};
use stemstage_core::{Track, TrackId, TransportState};

pub const HELP: &str = "\
Transport: play | pause | stop | seek <secs|m:ss>
Mixer:     vol <track> <0..1> | bal <track> <-1..1> | mute <track> | solo <track>
Other:     pitch <ratio> | levels | status | tracks | help | quit
<track> is a track id or a case-insensitive name prefix";

/// A track named on the console
#[derive(Debug, Clone, PartialEq)]
pub enum TrackRef {
    Id(u32),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Play,
    Pause,
    Stop,
    Seek(f64),
    Volume(TrackRef, f32),
    Balance(TrackRef, f32),
    /// Toggle mute
    Mute(TrackRef),
    /// Toggle solo
    Solo(TrackRef),
    Pitch(f32),
    Levels,
    Status,
    Tracks,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleError {
    Unknown(String),
    MissingArgument(&'static str),
    InvalidNumber(String),
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleError::Unknown(cmd) => write!(f, "unknown command '{}' (try 'help')", cmd),
            ConsoleError::MissingArgument(what) => write!(f, "missing {}", what),
            ConsoleError::InvalidNumber(s) => write!(f, "not a number: '{}'", s),
        }
    }
}

impl std::error::Error for ConsoleError {}

/// Parse one console line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "play" | "p" => ConsoleCommand::Play,
        "pause" => ConsoleCommand::Pause,
        "stop" => ConsoleCommand::Stop,
        "seek" => {
            let arg = args.first().ok_or(ConsoleError::MissingArgument("position"))?;
            ConsoleCommand::Seek(parse_position(arg)?)
        }
        "vol" | "volume" => {
            ConsoleCommand::Volume(track_arg(&args)?, number_arg(&args, 1, "volume")?)
        }
        "bal" | "balance" => {
            ConsoleCommand::Balance(track_arg(&args)?, number_arg(&args, 1, "balance")?)
        }
        "mute" => ConsoleCommand::Mute(track_arg(&args)?),
        "solo" => ConsoleCommand::Solo(track_arg(&args)?),
        "pitch" => ConsoleCommand::Pitch(number_arg(&args, 0, "ratio")?),
        "levels" | "l" => ConsoleCommand::Levels,
        "status" | "s" => ConsoleCommand::Status,
        "tracks" => ConsoleCommand::Tracks,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_position(arg: &str) -> Result<f64, ConsoleError> {
    if arg.contains(':') {
        return parse_timestamp(arg).ok_or_else(|| ConsoleError::InvalidNumber(arg.to_string()));
    }
    arg.parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .ok_or_else(|| ConsoleError::InvalidNumber(arg.to_string()))
}

fn track_arg(args: &[&str]) -> Result<TrackRef, ConsoleError> {
    let arg = args.first().ok_or(ConsoleError::MissingArgument("track"))?;
    Ok(match arg.parse::<u32>() {
        Ok(id) => TrackRef::Id(id),
        Err(_) => TrackRef::Name(arg.to_string()),
    })
}

fn number_arg(args: &[&str], index: usize, what: &'static str) -> Result<f32, ConsoleError> {
    let arg = args.get(index).ok_or(ConsoleError::MissingArgument(what))?;
    arg.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConsoleError::InvalidNumber(arg.to_string()))
}

/// Find the track a reference points at
///
/// Names match case-insensitively on a prefix; an ambiguous prefix matches nothing.
pub fn resolve_track<'a>(tracks: &'a [Track], track: &TrackRef) -> Option<&'a Track> {
    match track {
        TrackRef::Id(id) => tracks.iter().find(|t| t.id == TrackId(*id)),
        TrackRef::Name(name) => {
            let name = name.to_lowercase();
            if let Some(exact) = tracks.iter().find(|t| t.name.to_lowercase() == name) {
                return Some(exact);
            }
            let mut matches = tracks
                .iter()
                .filter(|t| t.name.to_lowercase().starts_with(&name));
            match (matches.next(), matches.next()) {
                (Some(track), None) => Some(track),
                _ => None,
            }
        }
    }
}

/// `m:ss.s`
pub fn format_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    let minutes = (secs / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, secs - minutes * 60.0)
}

pub fn format_status(state: &TransportState) -> String {
    let mode = match (state.is_ready, state.is_playing) {
        (false, _) => "loading",
        (true, true) => "playing",
        (true, false) => "paused",
    };
    let mut line = format!(
        "[{}] {} / {}",
        mode,
        format_time(state.current_time),
        format_time(state.duration)
    );
    if !state.failed_tracks.is_empty() {
        let failed: Vec<String> = state.failed_tracks.iter().map(|id| id.to_string()).collect();
        let _ = write!(line, "  failed tracks: {}", failed.join(", "));
    }
    if state.failed_cue_sends > 0 {
        let _ = write!(line, "  unsent cues: {}", state.failed_cue_sends);
    }
    line
}

pub fn format_tracks(tracks: &[Track]) -> String {
    let mut out = String::new();
    for track in tracks {
        let mut flags = String::new();
        if track.muted {
            flags.push_str(" M");
        }
        if track.solo {
            flags.push_str(" S");
        }
        let _ = writeln!(
            out,
            "{:>3} {:<16} vol {:.2} bal {:+.2}{}",
            track.id.0, track.name, track.volume, track.balance, flags
        );
    }
    out
}

const METER_WIDTH: usize = 20;

fn meter_cells(value: f32) -> usize {
    ((value.clamp(0.0, 100.0) / 100.0) * METER_WIDTH as f32).round() as usize
}

/// `#` up to the level, `|` where the held peak sits above it
fn meter_bar(level: f32, peak: f32) -> String {
    let filled = meter_cells(level);
    let peak_cell = meter_cells(peak);
    let mut bar: Vec<char> = std::iter::repeat('#')
        .take(filled)
        .chain(std::iter::repeat('.').take(METER_WIDTH - filled))
        .collect();
    if peak_cell > filled {
        bar[peak_cell - 1] = '|';
    }
    bar.into_iter().collect()
}

fn meter_line(label: &str, reading: &MeterReading) -> String {
    let MeterReading { level, peak } = reading;
    format!(
        "{:<16} L {} {:>3.0} pk {:>3.0}  R {} {:>3.0} pk {:>3.0}\n",
        label,
        meter_bar(level.left, peak.left),
        level.left,
        peak.left,
        meter_bar(level.right, peak.right),
        level.right,
        peak.right
    )
}

pub fn format_levels(snapshot: &LevelsSnapshot, tracks: &[Track]) -> String {
    let mut out = String::new();
    for (id, reading) in &snapshot.tracks {
        let name = tracks
            .iter()
            .find(|t| t.id == *id)
            .map_or_else(|| id.to_string(), |t| t.name.clone());
        out.push_str(&meter_line(&name, reading));
    }
    out.push_str(&meter_line("MASTER", &snapshot.master));
    out
}
