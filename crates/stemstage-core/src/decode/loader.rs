//! Background decode threads
//!
//! Each track decodes on its own thread. The control tick polls the result
//! with [`PendingDecode::try_take`] and never waits for it.

use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, TryRecvError};

use super::{decode_for_output, DecodeError, DecodedAudio};
use crate::types::TrackId;

type DecodeResult = Result<DecodedAudio, DecodeError>;

/// Handle to an in-flight decode
pub struct PendingDecode {
    rx: Receiver<DecodeResult>,
}

impl PendingDecode {
    /// Take the result if the decode has finished
    ///
    /// Returns `None` while decoding. After a result has been taken the
    /// channel is closed and later calls report [`DecodeError::Disconnected`].
    pub fn try_take(&mut self) -> Option<DecodeResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DecodeError::Disconnected)),
        }
    }

    /// Wrap an already-known result (used when no thread is needed)
    pub fn ready(result: DecodeResult) -> Self {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.send(result);
        Self { rx }
    }
}

/// Start decoding `path` for playback at `output_rate`
pub fn spawn_decode(track: TrackId, path: PathBuf, output_rate: u32) -> PendingDecode {
    let (tx, rx) = channel::bounded::<DecodeResult>(1);

    let spawned = thread::Builder::new()
        .name(format!("decode-{}", track))
        .spawn(move || {
            let started = Instant::now();
            let result = decode_for_output(&path, output_rate);
            match &result {
                Ok(audio) => log::info!(
                    "Track {} decoded: {:.1}s, {} channel(s) in {}ms",
                    track,
                    audio.duration_secs(),
                    audio.channels,
                    started.elapsed().as_millis()
                ),
                Err(e) => log::warn!("Track {} failed to decode: {}", track, e),
            }
            let _ = tx.send(result);
        });

    match spawned {
        Ok(_) => PendingDecode { rx },
        Err(e) => {
            log::error!("Failed to spawn decode thread for track {}: {}", track, e);
            PendingDecode::ready(Err(DecodeError::Unsupported(format!(
                "decode thread unavailable: {}",
                e
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::write_wav;
    use std::time::Duration;

    fn wait(pending: &mut PendingDecode) -> DecodeResult {
        for _ in 0..500 {
            if let Some(result) = pending.try_take() {
                return result;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("decode did not finish");
    }

    #[test]
    fn test_decode_completes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 48000, 1, &vec![1000i16; 4800]);

        let mut pending = spawn_decode(TrackId(1), path, 48000);
        let audio = wait(&mut pending).unwrap();
        assert_eq!(audio.frames.len(), 4800);
        assert!((audio.duration_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_failure_is_reported_not_raised() {
        let mut pending = spawn_decode(TrackId(2), PathBuf::from("/nonexistent.wav"), 48000);
        assert!(wait(&mut pending).is_err());
    }

    #[test]
    fn test_ready_result() {
        let mut pending = PendingDecode::ready(Err(DecodeError::Disconnected));
        assert!(matches!(pending.try_take(), Some(Err(DecodeError::Disconnected))));
    }
}
