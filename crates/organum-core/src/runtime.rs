//! Input worker thread.
//!
//! The worker owns the receiving end of the input channel and feeds every
//! message through the [`InputMap`] into the [`Organ`], one at a time, in
//! transport order. It checks a shared shutdown flag between messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::engine::Organ;
use crate::input::InputMap;
use crate::midi::MidiMessage;

/// How long the worker blocks before re-checking the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to the running input worker.
pub struct InputWorker {
    shutdown: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl InputWorker {
    /// Spawn the worker thread.
    pub fn spawn(
        organ: Organ,
        map: InputMap,
        messages: Receiver<MidiMessage>,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let thread_shutdown = shutdown.clone();
        let thread_handle = thread::Builder::new()
            .name("organum-input".to_string())
            .spawn(move || run(&organ, &map, &messages, &thread_shutdown))?;
        Ok(Self {
            shutdown,
            thread_handle: Some(thread_handle),
        })
    }

    /// Signal the worker to stop and wait for it.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Input worker panicked");
            }
        }
    }
}

impl Drop for InputWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.join();
    }
}

fn run(organ: &Organ, map: &InputMap, messages: &Receiver<MidiMessage>, shutdown: &AtomicBool) {
    log::info!("Input worker started");
    while !shutdown.load(Ordering::Relaxed) {
        match messages.recv_timeout(POLL_INTERVAL) {
            Ok(msg) => dispatch(organ, map, msg),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Input channel closed, input worker exiting");
                break;
            }
        }
    }
    log::info!("Input worker stopped");
}

/// Classify and apply one input message.
pub fn dispatch(organ: &Organ, map: &InputMap, msg: MidiMessage) {
    log::debug!("[INPUT] {}", msg);
    let event = match msg {
        MidiMessage::NoteOn {
            channel,
            note,
            velocity,
            ..
        } => map.classify(channel, note, velocity, true),
        MidiMessage::NoteOff { channel, note, .. } => map.classify(channel, note, 0, false),
        MidiMessage::ControlChange { .. } => {
            log::debug!("Ignoring control change");
            return;
        }
    };
    organ.handle(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Division};
    use crate::config::OrganConfig;
    use crate::output::{CollectingSink, OutputMessage};
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    const CONFIG: &str = r#"
        [[outputs]]
        name = "pipes"
        client_port = "20:2"

        [[ranks]]
        id = "R1"
        pitch_reference = 60
        address = "pipes 20:2:4"

        [[stops]]
        division = "swell"
        id = "VOX_HUMANA_8"
        ranks = [{ rank = "R1" }]

        [[input.manuals]]
        division = "swell"
        channel = 1
        first_note = 36
        last_note = 96

        [input.stops]
        channel = 15
        mappings = [{ note = 10, stop = "swell:VOX_HUMANA_8" }]
    "#;

    fn setup() -> (Organ, InputMap, Arc<CollectingSink>) {
        let config = OrganConfig::from_toml_str(CONFIG).unwrap();
        let catalog = Arc::new(Catalog::from_config(&config).unwrap());
        let map = InputMap::from_config(&config.input, &catalog).unwrap();
        let sink = Arc::new(CollectingSink::new());
        (Organ::new(catalog, sink.clone(), &config.routing), map, sink)
    }

    fn wait_for(sink: &CollectingSink, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_dispatch_sequence() {
        let (organ, map, sink) = setup();
        dispatch(&organ, &map, MidiMessage::from_bytes(&[0x91, 60, 80], 0).unwrap());
        dispatch(&organ, &map, MidiMessage::from_bytes(&[0x9F, 10, 127], 0).unwrap());
        assert_eq!(
            sink.take()[0].message,
            OutputMessage::NoteOn {
                channel: 4,
                note: 60,
                velocity: 64
            }
        );
        dispatch(&organ, &map, MidiMessage::from_bytes(&[0x91, 60, 0], 0).unwrap());
        dispatch(&organ, &map, MidiMessage::from_bytes(&[0xB1, 64, 127], 0).unwrap());
        assert_eq!(
            sink.take(),
            vec![crate::output::OutputCommand {
                output: "pipes".to_string(),
                message: OutputMessage::NoteOff { channel: 4, note: 60 }
            }]
        );
        assert!(!organ.snapshot().keys.is_held(Division::Swell, 60));
    }

    #[test]
    fn test_worker_processes_and_stops() {
        let (organ, map, sink) = setup();
        let (tx, rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = InputWorker::spawn(organ.clone(), map, rx, shutdown.clone()).unwrap();

        tx.send(MidiMessage::from_bytes(&[0x9F, 10, 127], 0).unwrap()).unwrap();
        tx.send(MidiMessage::from_bytes(&[0x91, 62, 100], 0).unwrap()).unwrap();
        wait_for(&sink, 1);
        assert_eq!(sink.len(), 1);

        worker.stop();
        assert!(shutdown.load(Ordering::SeqCst));

        // Messages after shutdown are not processed.
        let _ = tx.send(MidiMessage::from_bytes(&[0x81, 62, 0], 0).unwrap());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_worker_exits_when_channel_closes() {
        let (organ, map, _) = setup();
        let (tx, rx) = unbounded::<MidiMessage>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = InputWorker::spawn(organ, map, rx, shutdown).unwrap();
        drop(tx);
        worker.stop();
    }
}
