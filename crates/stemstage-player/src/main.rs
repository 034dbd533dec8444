//! Stemstage Player - multitrack stem playback with timed MIDI cues
//!
//! This is the main entry point for the console player. It:
//! 1. Loads the player config and the song file
//! 2. Starts the cpal output stream (with the optional pitch shifter)
//! 3. Connects the MIDI cue output
//! 4. Runs the session scheduler and reads commands from stdin
//!
//! ## Command line
//!
//! ```text
//! stemstage-player <song.yaml> [--config <player.yaml>]
//! stemstage-player --list-devices
//! ```

mod config;
mod console;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crossbeam::channel::Receiver;

use config::{default_player_config_path, PlayerConfig};
use console::{
    format_levels, format_status, format_tracks, parse_command, resolve_track, ConsoleCommand,
    HELP,
};
use stemstage_core::audio::{get_output_devices, start_audio_system, AudioSystemResult};
use stemstage_core::config::load_config;
use stemstage_core::engine::{
    MixChange, MixerStreamResolver, PerformanceEngine, SessionClient, SessionScheduler,
};
use stemstage_core::pitch::PitchControl;
use stemstage_core::song::load_song;
use stemstage_core::TransportState;
use stemstage_midi::{open_sink, MidiConnection};

#[derive(Debug, Default, PartialEq)]
struct Args {
    song: Option<PathBuf>,
    config: Option<PathBuf>,
    list_devices: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--list-devices" => parsed.list_devices = true,
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            _ if parsed.song.is_none() => parsed.song = Some(PathBuf::from(&arg)),
            _ => bail!("Unexpected argument {}", arg),
        }
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.list_devices {
        list_devices();
        return Ok(());
    }
    let Some(song_path) = args.song else {
        bail!("Usage: stemstage-player <song.yaml> [--config <player.yaml>] | --list-devices");
    };

    log::info!("stemstage-player starting up");
    let config_path = args.config.unwrap_or_else(default_player_config_path);
    let config: PlayerConfig = load_config(&config_path);
    let song = load_song(&song_path)?;

    let (pitch_control, pitch_unit) = match config.pitch.build() {
        Some((control, unit)) => (Some(control), Some(unit)),
        None => (None, None),
    };

    let AudioSystemResult {
        handle,
        command_sender,
        master_tap,
        sample_rate,
        latency_ms,
        ..
    } = start_audio_system(&config.audio, pitch_unit).context("Failed to start audio output")?;
    println!("Audio running at {} Hz (~{:.1} ms buffer)", sample_rate, latency_ms);
    if config.pitch.enabled {
        println!(
            "Pitch shift adds {:.1} ms; cues are sent that much ahead of the audio",
            config.pitch.latency_secs(sample_rate) * 1000.0
        );
    }

    let resolver = MixerStreamResolver::new(command_sender, sample_rate);
    let engine = PerformanceEngine::new(
        config.engine.clone(),
        Box::new(resolver),
        open_sink(&config.midi),
        Some(master_tap),
    );
    let client = SessionScheduler::spawn(engine).context("Failed to start session scheduler")?;

    client.load(song.tracks.clone(), song.regions.clone(), song.timed_cues())?;
    println!("Loading '{}' ({} tracks)...", song.title, song.tracks.len());
    watch_transport(client.subscribe()?)?;

    run_console(&client, pitch_control)?;

    client.shutdown();
    // Keep the stream alive until the engine has released its voices
    drop(handle);
    println!("Stemstage Player stopped.");
    Ok(())
}

fn list_devices() {
    println!("Audio outputs:");
    match get_output_devices() {
        Ok(devices) => {
            for device in devices {
                println!("  {}", device);
            }
        }
        Err(e) => println!("  ({})", e),
    }
    println!("MIDI outputs:");
    match MidiConnection::list_output_ports() {
        Ok(ports) if ports.is_empty() => println!("  (none)"),
        Ok(ports) => {
            for port in ports {
                println!("  {}", port);
            }
        }
        Err(e) => println!("  ({})", e),
    }
}

/// Report readiness, failures and end of song as they happen
///
/// The thread exits when the scheduler drops its subscribers.
fn watch_transport(states: Receiver<Arc<TransportState>>) -> Result<()> {
    std::thread::Builder::new()
        .name("status-watcher".into())
        .spawn(move || {
            let mut last = TransportState::default();
            for state in states.iter() {
                if state.is_ready && !last.is_ready {
                    println!("Ready: {}", format_status(&state));
                }
                if state.failed_tracks.len() > last.failed_tracks.len() {
                    log::warn!("Tracks failed to load: {:?}", state.failed_tracks);
                }
                if last.is_playing && !state.is_playing && state.current_time >= state.duration {
                    println!("End of song");
                }
                last = (*state).clone();
            }
        })
        .context("Failed to spawn status watcher")?;
    Ok(())
}

fn run_console(client: &SessionClient, mut pitch: Option<PitchControl>) -> Result<()> {
    println!("{}", HELP);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = execute(client, pitch.as_mut(), command) {
                    println!("error: {:#}", e);
                }
            }
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}

fn execute(
    client: &SessionClient,
    pitch: Option<&mut PitchControl>,
    command: ConsoleCommand,
) -> Result<()> {
    match command {
        ConsoleCommand::Play => client.play()?,
        ConsoleCommand::Pause => client.pause()?,
        ConsoleCommand::Stop => client.stop()?,
        ConsoleCommand::Seek(time) => {
            let actual = client.seek(time)?;
            println!("{}", console::format_time(actual));
        }
        ConsoleCommand::Volume(track, volume) => {
            let tracks = client.tracks()?;
            let track = resolve_track(&tracks, &track).context("No such track")?;
            client.mix(track.id, MixChange::Volume(volume))?;
        }
        ConsoleCommand::Balance(track, balance) => {
            let tracks = client.tracks()?;
            let track = resolve_track(&tracks, &track).context("No such track")?;
            client.mix(track.id, MixChange::Balance(balance))?;
        }
        ConsoleCommand::Mute(track) => {
            let tracks = client.tracks()?;
            let track = resolve_track(&tracks, &track).context("No such track")?;
            client.mix(track.id, MixChange::Muted(!track.muted))?;
            println!("{} {}", track.name, if track.muted { "unmuted" } else { "muted" });
        }
        ConsoleCommand::Solo(track) => {
            let tracks = client.tracks()?;
            let track = resolve_track(&tracks, &track).context("No such track")?;
            client.mix(track.id, MixChange::Solo(!track.solo))?;
            println!("{} solo {}", track.name, if track.solo { "off" } else { "on" });
        }
        ConsoleCommand::Pitch(ratio) => {
            let Some(pitch) = pitch else {
                bail!("Pitch shift is disabled (set pitch.enabled in the player config)");
            };
            if pitch.set_ratio(ratio) {
                println!("pitch ratio {:.3}", pitch.ratio());
            }
        }
        ConsoleCommand::Levels => {
            let tracks = client.tracks()?;
            print!("{}", format_levels(&client.levels()?, &tracks));
        }
        ConsoleCommand::Status => println!("{}", format_status(&*client.state()?)),
        ConsoleCommand::Tracks => print!("{}", format_tracks(&client.tracks()?)),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}
