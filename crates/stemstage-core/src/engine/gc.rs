//! Deferred deallocation for voices and decoded PCM
//!
//! Voices travel to the mixer as `basedrop::Owned` and hold their PCM in
//! `basedrop::Shared`. When the audio thread drops either one (on detach or
//! replace) the allocation is queued instead of freed; a background thread
//! owns the `Collector` and frees it later, so no `free` runs inside the
//! audio callback.

use basedrop::{Collector, Handle};
use crossbeam::channel;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = channel::bounded(1);

    let spawned = thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on the thread that runs it
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::info!("Audio GC thread started");
            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    let handle = spawned
        .map_err(|e| e.to_string())
        .and_then(|_| rx.recv().map_err(|e| e.to_string()));

    match handle {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("Audio GC thread unavailable ({}); released PCM will not be reclaimed", e);
            let collector = Collector::new();
            let handle = collector.handle();
            std::mem::forget(collector);
            handle
        }
    }
}

/// Handle for creating `Owned<T>` and `Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
