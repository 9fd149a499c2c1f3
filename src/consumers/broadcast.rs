//! Periodic frame broadcaster.
//!
//! The session protocol (RTSP handshakes, RTP packetization) lives in an
//! external library. Each established session is registered here as a
//! [`FrameSink`]; on every tick the broadcaster polls the store once and
//! hands the frame to all live sessions.

use crate::playback::FrameStore;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors reported by a session while sending.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The peer ended the session.
    #[error("session closed by peer")]
    Closed,
    /// Transport failure while writing the frame.
    #[error("failed to send frame: {0}")]
    Io(#[from] io::Error),
}

/// Minimal "send these bytes" interface to one streaming session.
pub trait FrameSink: Send {
    /// Sends one JPEG frame stamped with `timestamp_ms`.
    fn send_frame(&mut self, frame: &[u8], timestamp_ms: u64) -> Result<(), SinkError>;

    /// Whether the session has ended and should be dropped.
    fn is_stopped(&self) -> bool {
        false
    }
}

type Sessions = Arc<Mutex<Vec<Box<dyn FrameSink>>>>;

/// Cloneable handle for registering sessions with a running broadcaster.
///
/// While a tick is sending, its sessions are checked out of the list so
/// the lock is never held across a send; `sending` keeps them counted.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Sessions,
    sending: Arc<AtomicUsize>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn FrameSink>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a newly established session.
    pub fn add_session(&self, session: Box<dyn FrameSink>) {
        let mut sessions = self.lock();
        sessions.push(session);
        tracing::info!(connected = sessions.len(), "Broadcast session added");
    }

    /// Number of live sessions.
    pub fn num_connected(&self) -> usize {
        let sessions = self.lock();
        sessions.len() + self.sending.load(Ordering::Acquire)
    }

    fn check_out(&self) -> Vec<Box<dyn FrameSink>> {
        let mut sessions = self.lock();
        let taken = std::mem::take(&mut *sessions);
        self.sending.store(taken.len(), Ordering::Release);
        taken
    }

    /// Puts surviving sessions back ahead of any added during the send.
    fn check_in(&self, mut survivors: Vec<Box<dyn FrameSink>>) -> usize {
        let mut sessions = self.lock();
        survivors.append(&mut sessions);
        *sessions = survivors;
        self.sending.store(0, Ordering::Release);
        sessions.len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("connected", &self.num_connected())
            .finish()
    }
}

/// Outcome of one broadcaster tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Ordinal of the frame sent, if the pacer allowed one.
    pub ordinal: Option<usize>,
    /// Sessions that received the frame.
    pub delivered: usize,
    /// Sessions removed during this tick.
    pub dropped: usize,
}

/// Fans paced frames out to every registered session.
#[derive(Debug)]
pub struct Broadcaster {
    store: Arc<FrameStore>,
    registry: SessionRegistry,
}

impl Broadcaster {
    /// Creates a broadcaster with no sessions.
    pub fn new(store: Arc<FrameStore>) -> Self {
        Self {
            store,
            registry: SessionRegistry::new(),
        }
    }

    /// Registry shared with whatever accepts new sessions.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Number of live sessions.
    pub fn num_connected(&self) -> usize {
        self.registry.num_connected()
    }

    /// Polls the store once and sends the frame to every live session.
    ///
    /// With no sessions the store is not polled, so an idle broadcaster
    /// does not consume frames from the shared timeline.
    pub fn tick(&self, now_ms: u64) -> TickReport {
        let mut sessions = self.registry.check_out();
        let before = sessions.len();
        if before == 0 {
            return TickReport::default();
        }

        let frame = self.store.poll(now_ms);
        let mut delivered = 0;
        sessions.retain_mut(|session| {
            if session.is_stopped() {
                return false;
            }
            let Some(frame) = frame.as_ref() else {
                return true;
            };
            match session.send_frame(frame.data(), frame.capture_time_ms()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping broadcast session");
                    false
                }
            }
        });

        let report = TickReport {
            ordinal: frame.as_ref().map(|f| f.ordinal()),
            delivered,
            dropped: before - sessions.len(),
        };
        if let Some(frame) = frame {
            self.store.release(frame);
        }
        let connected = self.registry.check_in(sessions);
        if report.dropped > 0 {
            tracing::info!(
                dropped = report.dropped,
                connected,
                "Broadcast sessions removed"
            );
        }
        report
    }

    /// Ticks every `period` until `shutdown` flips to `true`.
    #[cfg(feature = "server")]
    pub async fn run(
        self,
        clock: Arc<dyn crate::playback::Clock>,
        period: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let this = Arc::new(self);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(period_ms = period.as_millis() as u64, "Broadcaster started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Sessions may block on I/O; keep sends off the async workers.
                    let broadcaster = Arc::clone(&this);
                    let now_ms = clock.now_ms();
                    if let Err(e) = tokio::task::spawn_blocking(move || broadcaster.tick(now_ms)).await {
                        tracing::error!(error = %e, "Broadcaster tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Broadcaster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::archive::{ArchivePaths, LoadLimits};
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSink {
        received: Arc<Mutex<Vec<(Vec<u8>, u64)>>>,
        stopped: Arc<AtomicBool>,
        fail: bool,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&mut self, frame: &[u8], timestamp_ms: u64) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Closed);
            }
            self.received.lock().unwrap().push((frame.to_vec(), timestamp_ms));
            Ok(())
        }

        fn is_stopped(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    struct SlowSink {
        started: mpsc::Sender<()>,
        delay: Duration,
    }

    impl FrameSink for SlowSink {
        fn send_frame(&mut self, _frame: &[u8], _timestamp_ms: u64) -> Result<(), SinkError> {
            let _ = self.started.send(());
            thread::sleep(self.delay);
            Ok(())
        }
    }

    fn store() -> Arc<FrameStore> {
        let mut writer = ArchiveWriter::new();
        writer.push(&[1, 1]).unwrap();
        writer.push(&[2, 2, 2]).unwrap();
        let storage = writer.into_storage().unwrap();
        Arc::new(FrameStore::open(&storage, &ArchivePaths::default(), LoadLimits::default()).unwrap())
    }

    #[test]
    fn test_idle_broadcaster_does_not_poll() {
        let store = store();
        let broadcaster = Broadcaster::new(Arc::clone(&store));

        assert_eq!(broadcaster.tick(0), TickReport::default());
        assert_eq!(store.stats().polls, 0);
    }

    #[test]
    fn test_frame_fans_out_to_all_sessions() {
        let store = store();
        let broadcaster = Broadcaster::new(Arc::clone(&store));
        let a = RecordingSink::default();
        let b = RecordingSink::default();
        let (a_rx, b_rx) = (Arc::clone(&a.received), Arc::clone(&b.received));
        broadcaster.registry().add_session(Box::new(a));
        broadcaster.registry().add_session(Box::new(b));

        let report = broadcaster.tick(0);
        assert_eq!(report.ordinal, Some(0));
        assert_eq!(report.delivered, 2);

        let report = broadcaster.tick(50);
        assert_eq!(report.ordinal, None);
        assert_eq!(report.delivered, 0);

        broadcaster.tick(100);
        assert_eq!(store.stats().emitted, 2);
        assert_eq!(*a_rx.lock().unwrap(), vec![(vec![1, 1], 0), (vec![2, 2, 2], 100)]);
        assert_eq!(*b_rx.lock().unwrap(), *a_rx.lock().unwrap());
    }

    #[test]
    fn test_stopped_and_failing_sessions_dropped() {
        let broadcaster = Broadcaster::new(store());
        let healthy = RecordingSink::default();
        let stopped = RecordingSink::default();
        let stop_flag = Arc::clone(&stopped.stopped);
        let failing = RecordingSink {
            fail: true,
            ..Default::default()
        };
        broadcaster.registry().add_session(Box::new(healthy));
        broadcaster.registry().add_session(Box::new(stopped));
        broadcaster.registry().add_session(Box::new(failing));

        let report = broadcaster.tick(0);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(broadcaster.num_connected(), 2);

        stop_flag.store(true, Ordering::SeqCst);
        let report = broadcaster.tick(10);
        assert_eq!(report.dropped, 1);
        assert_eq!(broadcaster.num_connected(), 1);
    }

    #[test]
    fn test_slow_session_does_not_block_registry() {
        let broadcaster = Arc::new(Broadcaster::new(store()));
        let (started_tx, started_rx) = mpsc::channel();
        broadcaster.registry().add_session(Box::new(SlowSink {
            started: started_tx,
            delay: Duration::from_millis(400),
        }));

        let ticking = Arc::clone(&broadcaster);
        let handle = thread::spawn(move || ticking.tick(0));
        started_rx.recv().unwrap();

        let registry = broadcaster.registry();
        let begin = Instant::now();
        assert_eq!(registry.num_connected(), 1);
        registry.add_session(Box::new(RecordingSink::default()));
        assert_eq!(registry.num_connected(), 2);
        assert!(begin.elapsed() < Duration::from_millis(200));

        let report = handle.join().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(broadcaster.num_connected(), 2);
    }

    #[cfg(feature = "server")]
    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let store = store();
        let broadcaster = Broadcaster::new(Arc::clone(&store));
        let sink = RecordingSink::default();
        let received = Arc::clone(&sink.received);
        broadcaster.registry().add_session(Box::new(sink));

        let clock = Arc::new(crate::playback::ManualClock::new(0));
        let (tx, rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(broadcaster.run(
            clock.clone(),
            std::time::Duration::from_millis(10),
            rx,
        ));

        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
