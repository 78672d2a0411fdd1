//! Latency measurement probe.
//!
//! Layered on top of the frame loop: the application polls once per
//! rendered frame, and when a measurement cycle is active it must clear
//! that frame to the returned flat color so the hardware photodiode can
//! time the round trip. Safe from any thread.

use crate::time::TimeSource;
use crate::types::Rgb;
use crate::{HmdError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Frames between automatic measurement cycles.
const CYCLE_INTERVAL_FRAMES: u32 = 120;
/// Frames the test color is held on screen per cycle.
const CYCLE_DISPLAY_FRAMES: u32 = 10;

const TEST_COLORS: [Rgb; 2] = [
    Rgb { r: 0, g: 0, b: 0 },
    Rgb {
        r: 255,
        g: 255,
        b: 255,
    },
];

struct LatencyState {
    frames_since_cycle: u32,
    frames_remaining: u32,
    color_index: usize,
    cycle_started_at: f64,
    last_latency_s: f64,
}

/// Per-session latency probe. Results are delivered over a channel so the
/// blocking result call can wait for a cycle driven by the render loop on
/// another thread.
pub(crate) struct LatencyProbe {
    state: Mutex<LatencyState>,
    results_tx: Sender<String>,
    results_rx: Receiver<String>,
    clock: Arc<dyn TimeSource>,
}

impl LatencyProbe {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        let (results_tx, results_rx) = crossbeam_channel::bounded(4);
        Self {
            state: Mutex::new(LatencyState {
                frames_since_cycle: 0,
                frames_remaining: 0,
                color_index: 0,
                cycle_started_at: 0.0,
                last_latency_s: -1.0,
            }),
            results_tx,
            results_rx,
            clock,
        }
    }

    /// Non-blocking per-frame poll. Returns the color to clear the screen
    /// with while a measurement cycle is running, `None` otherwise.
    /// `enabled` reflects the session's `LATENCY_TEST` capability bit.
    pub fn process(&self, enabled: bool) -> Option<Rgb> {
        if !enabled {
            return None;
        }
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(e) => e.into_inner(),
        };

        if state.frames_remaining > 0 {
            state.frames_remaining -= 1;
            if state.frames_remaining == 0 {
                let elapsed = self.clock.now() - state.cycle_started_at;
                state.last_latency_s = elapsed / CYCLE_DISPLAY_FRAMES as f64;
                let report = format!(
                    "latency {:.2} ms over {} frames",
                    state.last_latency_s * 1000.0,
                    CYCLE_DISPLAY_FRAMES
                );
                log::debug!("latency cycle complete: {}", report);
                // Drop the report if nobody drained earlier results.
                let _ = self.results_tx.try_send(report);
                state.color_index = (state.color_index + 1) % TEST_COLORS.len();
                return None;
            }
            return Some(TEST_COLORS[state.color_index]);
        }

        state.frames_since_cycle += 1;
        if state.frames_since_cycle >= CYCLE_INTERVAL_FRAMES {
            state.frames_since_cycle = 0;
            state.frames_remaining = CYCLE_DISPLAY_FRAMES;
            state.cycle_started_at = self.clock.now();
            return Some(TEST_COLORS[state.color_index]);
        }
        None
    }

    /// Blocking: waits until a measurement cycle completes and returns its
    /// human-readable report. The render loop must keep calling
    /// [`process`](Self::process) from another thread for a cycle to
    /// finish.
    pub fn result(&self, enabled: bool) -> Result<String> {
        if !enabled {
            return Err(HmdError::Unsupported);
        }
        self.results_rx
            .recv()
            .map_err(|_| HmdError::Disconnected)
    }

    /// Last measured latency in seconds, or -1.0 when unsupported or not
    /// yet measured. Never an error signal.
    pub fn measured_seconds(&self, enabled: bool) -> f64 {
        if !enabled {
            return -1.0;
        }
        match self.state.lock() {
            Ok(state) => state.last_latency_s,
            Err(_) => -1.0,
        }
    }
}
