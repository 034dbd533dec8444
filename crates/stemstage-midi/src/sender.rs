//! Fire-and-forget MIDI sending for the cue scheduler
//!
//! The session thread must never wait on a MIDI driver, so encoded messages
//! go through a bounded queue to a dedicated writer thread:
//!
//! ```text
//! CueScheduler → send_command() → flume (bounded) → midi-out thread → port
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use flume::{Receiver, Sender, TrySendError};
use midir::MidiOutputConnection;
use stemstage_core::cue_sheet::CueCommand;
use stemstage_core::engine::CommandSink;

use crate::encode::{encode, MidiBytes};

/// Something raw MIDI bytes can be written to
pub trait MidiWrite: Send + 'static {
    fn write(&mut self, bytes: &[u8]) -> Result<(), String>;
}

impl MidiWrite for MidiOutputConnection {
    fn write(&mut self, bytes: &[u8]) -> Result<(), String> {
        self.send(bytes).map_err(|e| e.to_string())
    }
}

/// [`CommandSink`] backed by a writer thread
pub struct MidiCommandSender {
    tx: Option<Sender<MidiBytes>>,
    thread: Option<JoinHandle<()>>,
    port_name: String,
    write_failures: Arc<AtomicU64>,
}

impl MidiCommandSender {
    /// Start the writer thread for `output`
    pub fn spawn<W: MidiWrite>(
        output: W,
        port_name: impl Into<String>,
        capacity: usize,
    ) -> std::io::Result<Self> {
        let (tx, rx) = flume::bounded::<MidiBytes>(capacity.max(1));
        let write_failures = Arc::new(AtomicU64::new(0));
        let failures = write_failures.clone();
        let port_name = port_name.into();
        let thread_port = port_name.clone();

        let thread = std::thread::Builder::new()
            .name("midi-out".into())
            .spawn(move || run(output, rx, failures, thread_port))?;

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
            port_name,
            write_failures,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Messages the port refused after they were queued
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

fn run<W: MidiWrite>(
    mut output: W,
    rx: Receiver<MidiBytes>,
    failures: Arc<AtomicU64>,
    port_name: String,
) {
    log::info!("MIDI writer started for {}", port_name);
    for message in rx.iter() {
        if let Err(e) = output.write(message.as_slice()) {
            failures.fetch_add(1, Ordering::Relaxed);
            log::warn!("MIDI output: Failed to send message: {}", e);
        }
    }
    log::info!("MIDI writer for {} shutting down", port_name);
}

impl CommandSink for MidiCommandSender {
    fn send_command(&mut self, command: &CueCommand) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let message = encode(command);
        log::debug!("[MIDI OUT] {} {:02X?}", command, message.as_slice());
        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("MIDI queue full, dropping {}", command);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("MIDI writer gone, dropping {}", command);
                false
            }
        }
    }
}

impl Drop for MidiCommandSender {
    fn drop(&mut self) {
        // Closing the queue ends the writer loop
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Sink used when no MIDI port is configured or reachable
#[derive(Debug, Default)]
pub struct OfflineSink;

impl CommandSink for OfflineSink {
    fn send_command(&mut self, command: &CueCommand) -> bool {
        log::warn!("No MIDI output connected, cue not sent: {}", command);
        false
    }
}
