// Playback session -- player state machine plus the thread that persists progress.
//
// Player events arrive over a channel. Time updates are debounced; pause,
// end, visibility loss and unload write the pending progress straight away.
// All writes for one session happen on its own thread, in arrival order.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::db::schema::{self, PlaybackProgress};
use crate::db::Store;
use crate::error::{Result, ShelfError};

use super::debounce::Debouncer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Media is ready; playback has not started.
    Loaded,
    Play,
    TimeUpdate { current_time: f64, duration: f64 },
    Pause,
    Ended,
    Error(String),
    /// The player went to the background.
    VisibilityLost,
    /// The player is going away. Ends the session.
    Unload,
}

/// Which playback record a session writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub stable_id: String,
    pub episode_id: String,
    pub arc_id: String,
}

#[derive(Debug)]
pub struct PlaybackSession {
    key: SessionKey,
    state: PlayerState,
    debouncer: Debouncer<PlaybackProgress>,
    last_position: Option<(f64, f64)>,
    last_stamp: i64,
}

impl PlaybackSession {
    pub fn new(key: SessionKey, delay: Duration) -> Self {
        Self {
            key,
            state: PlayerState::Loading,
            debouncer: Debouncer::new(delay),
            last_position: None,
            last_stamp: 0,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Next time `poll` may return a write.
    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Apply one event. Returns a record to write now, if the event demands it.
    pub fn handle(&mut self, event: PlaybackEvent, now: Instant) -> Option<PlaybackProgress> {
        match event {
            PlaybackEvent::Loaded => {
                self.state = PlayerState::Paused;
                None
            }
            PlaybackEvent::Play => {
                self.state = PlayerState::Playing;
                None
            }
            PlaybackEvent::TimeUpdate { .. } if self.state == PlayerState::Error => {
                // Positions reported by a failed player are not trusted
                None
            }
            PlaybackEvent::TimeUpdate { current_time, duration } => {
                let current_time = sanitize(current_time);
                let duration = sanitize(duration);
                self.last_position = Some((current_time, duration));
                let record = self.record(current_time, duration);
                self.debouncer.push(record, now);
                None
            }
            PlaybackEvent::Pause => {
                self.state = PlayerState::Paused;
                self.debouncer.flush()
            }
            PlaybackEvent::Ended => {
                self.state = PlayerState::Ended;
                if let Some(pending) = self.debouncer.flush() {
                    return Some(pending);
                }
                // Ended with nothing pending still records the final position
                let (t, d) = self.last_position?;
                Some(self.record(t, d))
            }
            PlaybackEvent::Error(message) => {
                log::warn!("Playback error on {}: {}", self.key.stable_id, message);
                self.state = PlayerState::Error;
                None
            }
            PlaybackEvent::VisibilityLost => self.debouncer.flush(),
            PlaybackEvent::Unload => {
                self.state = PlayerState::Idle;
                self.debouncer.flush()
            }
        }
    }

    /// Returns the debounced record once its timer has expired.
    pub fn poll(&mut self, now: Instant) -> Option<PlaybackProgress> {
        self.debouncer.poll(now)
    }

    /// Drop the timer and return whatever is pending.
    pub fn flush(&mut self) -> Option<PlaybackProgress> {
        self.debouncer.flush()
    }

    fn record(&mut self, current_time: f64, duration: f64) -> PlaybackProgress {
        // Wall clock can step backwards; lastWatched must not
        self.last_stamp = self.last_stamp.max(schema::now_millis());
        PlaybackProgress {
            id: self.key.stable_id.clone(),
            episode_id: self.key.episode_id.clone(),
            arc_id: self.key.arc_id.clone(),
            current_time,
            duration,
            last_watched: self.last_stamp,
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// What a finished session did.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub writes: usize,
    pub failed_writes: usize,
    pub last_written: Option<PlaybackProgress>,
    pub final_state: PlayerState,
}

/// Sending side of a running session.
pub struct SessionHandle {
    sender: Sender<PlaybackEvent>,
    join: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub fn send(&self, event: PlaybackEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| ShelfError::Other("Playback session has already ended".to_string()))
    }

    /// A sender for other threads feeding the same session.
    pub fn sender(&self) -> Sender<PlaybackEvent> {
        self.sender.clone()
    }

    /// Unload the player and wait for the last write to land.
    pub fn finish(self) -> Result<SessionSummary> {
        // The session may have stopped already; joining still returns its summary
        let _ = self.sender.send(PlaybackEvent::Unload);
        drop(self.sender);
        self.join
            .join()
            .map_err(|_| ShelfError::Other("Playback session thread panicked".to_string()))
    }
}

/// Start a session thread that writes progress for `key` into `store`.
pub fn spawn_session(store: Store, key: SessionKey, delay: Duration) -> Result<SessionHandle> {
    let (sender, receiver) = mpsc::channel();
    let name = format!("playback-{}", key.episode_id);
    let session = PlaybackSession::new(key, delay);

    let join = std::thread::Builder::new()
        .name(name)
        .spawn(move || session_loop(store, session, receiver))?;

    Ok(SessionHandle { sender, join })
}

fn session_loop(store: Store, mut session: PlaybackSession, receiver: Receiver<PlaybackEvent>) -> SessionSummary {
    let mut summary = SessionSummary {
        writes: 0,
        failed_writes: 0,
        last_written: None,
        final_state: session.state(),
    };

    loop {
        let received = match session.deadline() {
            Some(due) => {
                let wait = due.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(event) => Some(event),
                Err(_) => break,
            },
        };

        match received {
            Some(event) => {
                let unload = event == PlaybackEvent::Unload;
                if let Some(progress) = session.handle(event, Instant::now()) {
                    persist(&store, progress, &mut summary);
                }
                if unload {
                    summary.final_state = session.state();
                    return summary;
                }
            }
            None => {
                if let Some(progress) = session.poll(Instant::now()) {
                    persist(&store, progress, &mut summary);
                }
            }
        }
    }

    // Every sender is gone without an unload
    if let Some(progress) = session.flush() {
        persist(&store, progress, &mut summary);
    }
    summary.final_state = session.state();
    summary
}

fn persist(store: &Store, progress: PlaybackProgress, summary: &mut SessionSummary) {
    match store.with_conn(|conn| schema::upsert_playback(conn, &progress)) {
        Ok(()) => {
            log::debug!("Saved progress {} at {:.1}s", progress.id, progress.current_time);
            summary.writes += 1;
            summary.last_written = Some(progress);
        }
        Err(e) => {
            log::error!("Failed to save progress for {}: {}", progress.id, e);
            summary.failed_writes += 1;
        }
    }
}
