// Run-termination state shared between the decoder thread and a watchdog.
//
// The decoder polls the signal once per emulated instruction.  Whoever
// raises it first wins: once a run has a terminal reason it keeps it until
// the next run resets the signal.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

/// Why an emulation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StopReason {
    NotStopped = 0,
    /// The loader returned to the sentinel address.
    End = 1,
    /// Missing symbol or otherwise unusable cartridge setup.
    InitError = 2,
    /// A generator wrote below the tile window.
    OutOfRangeWriteLow = 3,
    /// A generator wrote past the tile window, below the configured ceiling.
    OutOfRangeWriteHigh = 4,
    /// A generator needs more parameter bytes than the model can hold.
    GeneratorTooLarge = 5,
    /// The watchdog gave up on the run.
    Timeout = 6,
    /// A reload produced a different number of generators than expected.
    GeneratorCountMismatch = 7,
}

impl StopReason {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => StopReason::End,
            2 => StopReason::InitError,
            3 => StopReason::OutOfRangeWriteLow,
            4 => StopReason::OutOfRangeWriteHigh,
            5 => StopReason::GeneratorTooLarge,
            6 => StopReason::Timeout,
            7 => StopReason::GeneratorCountMismatch,
            _ => StopReason::NotStopped,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != StopReason::NotStopped
    }

    /// Short user-facing explanation.
    pub fn message(self) -> &'static str {
        match self {
            StopReason::NotStopped => "Emulation has not stopped",
            StopReason::End => "Emulation completed normally",
            StopReason::InitError => "Emulation could not be initialized",
            StopReason::OutOfRangeWriteLow => {
                "A generator wrote below tile memory; the level data is corrupt"
            }
            StopReason::OutOfRangeWriteHigh => {
                "A generator wrote past the end of tile memory; the level data is corrupt"
            }
            StopReason::GeneratorTooLarge => "A generator has more parameters than can be stored",
            StopReason::Timeout => "Emulation timed out; the level data probably hangs the loader",
            StopReason::GeneratorCountMismatch => {
                "The edited level decoded to a different number of generators"
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Shared signal
// ─────────────────────────────────────────────────────────────────────────────

/// A watchdog that runs out marks the signal expired.  Expiry outlives
/// `reset`, so every later run of the same guarded operation stops with
/// `Timeout` until the watchdog is disarmed.
#[derive(Debug, Default)]
pub struct StopSignal {
    state: AtomicU8,
    expired: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> StopReason {
        StopReason::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Start of a fresh run.
    pub fn reset(&self) {
        self.state.store(StopReason::NotStopped as u8, Ordering::SeqCst);
        if self.expired.load(Ordering::SeqCst) {
            self.raise(StopReason::Timeout);
        }
    }

    /// Move from `NotStopped` to `reason`.  Returns false if the run already
    /// had a terminal reason, which is then left untouched.
    pub fn raise(&self, reason: StopReason) -> bool {
        self.state
            .compare_exchange(
                StopReason::NotStopped as u8,
                reason as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.get().is_terminal()
    }

    /// Budget used up: stop the current run and any run started after it.
    pub fn expire(&self) -> bool {
        self.expired.store(true, Ordering::SeqCst);
        self.raise(StopReason::Timeout)
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    fn clear_expired(&self) {
        self.expired.store(false, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Watchdog
// ─────────────────────────────────────────────────────────────────────────────

/// Raises `Timeout` on a signal unless disarmed within the budget.
///
/// Dropping the watchdog disarms it, joins its thread and clears the
/// signal's expiry.
pub struct Watchdog {
    signal: Arc<StopSignal>,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm(signal: Arc<StopSignal>, timeout: Duration) -> Self {
        signal.clear_expired();
        let (tx, rx) = bounded::<()>(1);
        let watched = signal.clone();
        let spawned = thread::Builder::new()
            .name("nodice-watchdog".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                    watched.expire();
                    log::warn!("Watchdog: emulation exceeded {} ms", timeout.as_millis());
                }
            });

        let handle = match spawned {
            Ok(h) => Some(h),
            Err(e) => {
                log::error!("Watchdog: cannot spawn thread: {e}");
                None
            }
        };

        Self {
            signal,
            cancel: Some(tx),
            handle,
        }
    }

    pub fn disarm(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.try_send(());
        }
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
        self.signal.clear_expired();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
