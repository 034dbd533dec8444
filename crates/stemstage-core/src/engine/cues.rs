//! Timestamp-triggered command scheduler
//!
//! Walks a time-sorted cue list against the transport position and hands
//! each cue to the command collaborator exactly once per forward pass.
//! Sends are fire-and-forget: a rejected send still counts as fired, since
//! a late command in the middle of a song is worse than a missing one.

use crate::cue_sheet::CueCommand;

/// Outbound command collaborator (a MIDI port in production)
///
/// Returns `false` when the command could not be handed off. Implementations
/// must not block; the scheduler calls this from the control tick.
pub trait CommandSink: Send {
    fn send_command(&mut self, command: &CueCommand) -> bool;
}

/// A command bound to a playback position
#[derive(Debug, Clone, PartialEq)]
pub struct TimedCue {
    pub timestamp: f64,
    pub command: CueCommand,
    /// Display text of the annotation line the cue came from
    pub label: String,
    fired: bool,
}

impl TimedCue {
    pub fn new(timestamp: f64, command: CueCommand, label: impl Into<String>) -> Self {
        Self {
            timestamp,
            command,
            label: label.into(),
            fired: false,
        }
    }

    /// Whether the cue already fired during the current pass
    pub fn is_fired(&self) -> bool {
        self.fired
    }
}

pub struct CueScheduler {
    cues: Vec<TimedCue>,
    window: f64,
    sink: Box<dyn CommandSink>,
    failed_sends: u32,
}

impl CueScheduler {
    pub fn new(sink: Box<dyn CommandSink>, window_secs: f64) -> Self {
        Self {
            cues: Vec::new(),
            window: window_secs,
            sink,
            failed_sends: 0,
        }
    }

    /// Replace the cue list; all cues start armed
    pub fn set_cues(&mut self, mut cues: Vec<TimedCue>) {
        cues.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        for cue in &mut cues {
            cue.fired = false;
        }
        log::info!("Cue scheduler armed with {} cue(s)", cues.len());
        self.cues = cues;
    }

    pub fn cues(&self) -> &[TimedCue] {
        &self.cues
    }

    /// Fire every armed cue whose window contains `time`
    ///
    /// Returns the number of cues fired during this call.
    pub fn apply_tick(&mut self, time: f64) -> usize {
        let mut fired = 0;
        for cue in &mut self.cues {
            if cue.timestamp > time {
                break;
            }
            if cue.fired || time >= cue.timestamp + self.window {
                continue;
            }

            cue.fired = true;
            fired += 1;
            if self.sink.send_command(&cue.command) {
                log::info!(
                    "Cue fired at {:.3}s (scheduled {:.3}s): {} {}",
                    time,
                    cue.timestamp,
                    cue.command,
                    cue.label
                );
            } else {
                self.failed_sends = self.failed_sends.saturating_add(1);
                log::warn!(
                    "Cue send failed at {:.3}s: {} (not retried)",
                    time,
                    cue.command
                );
            }
        }
        fired
    }

    /// Re-arm cues after `time` and mark earlier ones fired
    ///
    /// Marking passed cues avoids a burst of stale commands after a forward
    /// seek; re-arming later cues lets them fire again after a backward one.
    pub fn seek(&mut self, time: f64) {
        for cue in &mut self.cues {
            cue.fired = cue.timestamp <= time;
        }
    }

    /// Arm every cue (transport stopped at the song start)
    pub fn reset(&mut self) {
        for cue in &mut self.cues {
            cue.fired = false;
        }
    }

    /// Total rejected sends since construction
    pub fn failed_sends(&self) -> u32 {
        self.failed_sends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::RecordingSink;

    fn pc(program: u8) -> CueCommand {
        CueCommand::ProgramChange { channel: 0, program }
    }

    fn scheduler(sink: &RecordingSink) -> CueScheduler {
        CueScheduler::new(Box::new(sink.clone()), 0.5)
    }

    #[test]
    fn test_fires_once_inside_window() {
        let sink = RecordingSink::new();
        let mut cues = scheduler(&sink);
        cues.set_cues(vec![TimedCue::new(10.0, pc(1), "verse")]);

        assert_eq!(cues.apply_tick(9.99), 0);
        assert_eq!(cues.apply_tick(10.2), 1);
        assert_eq!(cues.apply_tick(10.3), 0);
        assert_eq!(sink.sent(), vec![pc(1)]);
    }

    #[test]
    fn test_missed_window_does_not_fire_late() {
        let sink = RecordingSink::new();
        let mut cues = scheduler(&sink);
        cues.set_cues(vec![TimedCue::new(10.0, pc(1), "")]);

        assert_eq!(cues.apply_tick(10.5), 0);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_seek_rearms_and_marks() {
        let sink = RecordingSink::new();
        let mut cues = scheduler(&sink);
        cues.set_cues(vec![
            TimedCue::new(5.0, pc(1), ""),
            TimedCue::new(10.0, pc(2), ""),
            TimedCue::new(15.0, pc(3), ""),
        ]);
        cues.apply_tick(5.1);
        cues.apply_tick(10.1);

        for t in [0.0, 5.0, 7.5, 10.0, 12.0, 20.0] {
            cues.seek(t);
            for cue in cues.cues() {
                assert_eq!(cue.is_fired(), cue.timestamp <= t, "seek {} cue {}", t, cue.timestamp);
            }
        }
    }

    #[test]
    fn test_forward_seek_does_not_flood() {
        let sink = RecordingSink::new();
        let mut cues = scheduler(&sink);
        cues.set_cues(vec![TimedCue::new(1.0, pc(1), ""), TimedCue::new(2.0, pc(2), "")]);

        cues.seek(2.0);
        assert_eq!(cues.apply_tick(2.1), 0);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_failed_send_still_marks_fired() {
        let sink = RecordingSink::failing();
        let mut cues = scheduler(&sink);
        cues.set_cues(vec![TimedCue::new(1.0, pc(1), "")]);

        assert_eq!(cues.apply_tick(1.0), 1);
        assert_eq!(cues.apply_tick(1.1), 0);
        assert_eq!(cues.failed_sends(), 1);
        assert!(cues.cues()[0].is_fired());
    }

    #[test]
    fn test_cue_at_zero_fires_after_reset() {
        let sink = RecordingSink::new();
        let mut cues = scheduler(&sink);
        cues.set_cues(vec![TimedCue::new(0.0, pc(9), "")]);
        assert_eq!(cues.apply_tick(0.0), 1);

        cues.reset();
        assert_eq!(cues.apply_tick(0.016), 1);
        assert_eq!(sink.sent().len(), 2);
    }
}
