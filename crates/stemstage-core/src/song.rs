//! Song definition files
//!
//! A song is a YAML document listing its stems, mute regions and the
//! cue-sheet annotation text:
//!
//! ```yaml
//! title: Opener
//! tracks:
//!   - { id: 1, name: Drums, source: stems/drums.flac }
//!   - { id: 2, name: Keys, source: stems/keys.wav, volume: 0.8, balance: -0.2 }
//! regions:
//!   - { id: 1, track: 2, start: 30.0, end: 45.5 }
//! cue_sheet: |
//!   [00:00] Intro [[PC:1:1]]
//!   [00:30] Verse, lead patch [[PC:1:4]]
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cue_sheet::{parse_cue_sheet, CueSheet};
use crate::engine::{EngineError, TimedCue};
use crate::types::{MuteRegion, Track, MAX_TRACKS};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongDefinition {
    pub title: String,
    pub tracks: Vec<Track>,
    pub regions: Vec<MuteRegion>,
    /// Free-form annotations with embedded `[[CMD:...]]` tokens
    pub cue_sheet: String,
}

impl SongDefinition {
    pub fn parse_cue_sheet(&self) -> CueSheet {
        parse_cue_sheet(&self.cue_sheet)
    }

    /// Cues for the scheduler, sorted by timestamp
    pub fn timed_cues(&self) -> Vec<TimedCue> {
        self.parse_cue_sheet().timed_cues()
    }

    /// Make relative track sources relative to `base`
    pub fn resolve_sources(&mut self, base: &Path) {
        for track in &mut self.tracks {
            if track.source_ref.is_relative() {
                track.source_ref = base.join(&track.source_ref);
            }
        }
    }

    /// Reject songs the engine cannot play
    ///
    /// Regions pointing at unknown tracks are only warned about; the engine
    /// ignores them.
    pub fn validate(&self) -> Result<()> {
        if self.tracks.len() > MAX_TRACKS {
            return Err(EngineError::TooManyTracks {
                count: self.tracks.len(),
                max: MAX_TRACKS,
            }
            .into());
        }
        let mut ids = HashSet::new();
        for track in &self.tracks {
            if !ids.insert(track.id) {
                bail!("Duplicate track id {}", track.id);
            }
        }
        for region in &self.regions {
            if !ids.contains(&region.track_id) {
                log::warn!(
                    "Mute region {} refers to unknown track {}",
                    region.id,
                    region.track_id
                );
            }
        }
        Ok(())
    }
}

/// Read, validate and resolve a song file
pub fn load_song(path: &Path) -> Result<SongDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read song file {:?}", path))?;
    let mut song: SongDefinition = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse song file {:?}", path))?;
    song.validate()
        .with_context(|| format!("Invalid song file {:?}", path))?;
    if let Some(dir) = path.parent() {
        song.resolve_sources(dir);
    }
    log::info!(
        "Loaded song '{}': {} track(s), {} region(s)",
        song.title,
        song.tracks.len(),
        song.regions.len()
    );
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue_sheet::CueCommand;
    use crate::types::TrackId;

    const SONG: &str = r#"
title: Opener
tracks:
  - { id: 1, name: Drums, source: stems/drums.flac }
  - { id: 2, name: Keys, source: /abs/keys.wav, volume: 0.8, balance: -0.2 }
regions:
  - { id: 1, track: 2, start: 30.0, end: 45.5 }
cue_sheet: |
  [00:00] Intro [[PC:1:1]]
  Free text without a timestamp
  [00:30] Verse [[PC:1:4]] [[CC:1:7:100]]
"#;

    #[test]
    fn test_load_song_resolves_relative_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opener.yaml");
        std::fs::write(&path, SONG).unwrap();

        let song = load_song(&path).unwrap();
        assert_eq!(song.title, "Opener");
        assert_eq!(song.tracks[0].source_ref, dir.path().join("stems/drums.flac"));
        assert_eq!(song.tracks[1].source_ref, Path::new("/abs/keys.wav"));
        assert_eq!(song.tracks[1].volume, 0.8);
        assert_eq!(song.tracks[0].volume, 1.0);
        assert_eq!(song.regions[0].track_id, TrackId(2));

        let cues = song.timed_cues();
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].command, CueCommand::ProgramChange { channel: 0, program: 1 });
        assert_eq!(cues[2].timestamp, 30.0);
    }

    #[test]
    fn test_too_many_tracks_rejected() {
        let song = SongDefinition {
            tracks: (0..7).map(|i| Track::new(i, "t", "t.wav")).collect(),
            ..SongDefinition::default()
        };
        let err = song.validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::TooManyTracks { count: 7, max: 6 })
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let song = SongDefinition {
            tracks: vec![Track::new(1, "a", "a.wav"), Track::new(1, "b", "b.wav")],
            ..SongDefinition::default()
        };
        assert!(song.validate().is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_song(Path::new("/nonexistent/song.yaml")).unwrap_err();
        assert!(err.to_string().contains("song.yaml"));
    }
}
