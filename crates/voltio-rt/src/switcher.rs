//! Click-free switching between processing contexts.

use std::collections::VecDeque;

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, warn};

use crate::context::ProcessingContext;
use crate::messages::SwitchMode;

/// Crossfade window in seconds.
const FADE_SECONDS: f64 = 0.001_5;

/// What the engine must fade during the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePhase {
    /// No transition in progress.
    None,
    /// Fade the outgoing context's input to zero at the end of the
    /// block. The context's own output tail is not faded; a reverb or
    /// delay node can still ring past the ramp. Known limitation,
    /// carried over unchanged.
    FadeOut,
    /// The swap happened at this block boundary; fade the incoming
    /// context's output up from zero.
    FadeIn,
}

enum State {
    Direct,
    FadeOutPending,
    FadeInPending,
}

/// Holds the active context and runs the two-block fade-out/fade-in
/// sequence. Every context that leaves the switcher goes back to the
/// command thread through the retirement queue, including on drop.
pub struct ProgramSwitcher {
    fade_len: usize,
    state: State,
    active: Option<Box<ProcessingContext>>,
    incoming: Option<Box<ProcessingContext>>,
    /// Contexts whose retirement send failed, oldest first. Flushed
    /// every block; drained only by the command thread, never freed
    /// here. Preallocated so a full queue does not cost an allocation.
    backlog: VecDeque<Box<ProcessingContext>>,
    retired_tx: Sender<Box<ProcessingContext>>,
}

impl ProgramSwitcher {
    /// Creates a switcher with no active context. `backlog_capacity`
    /// should match the retirement queue's capacity.
    #[must_use]
    pub fn new(
        sample_rate: f64,
        backlog_capacity: usize,
        retired_tx: Sender<Box<ProcessingContext>>,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw = (sample_rate * FADE_SECONDS).round() as usize;
        // Multiple of 4 so the fade vectorizes cleanly, minimum 4.
        let fade_len = raw.max(4).div_ceil(4) * 4;
        Self {
            fade_len,
            state: State::Direct,
            active: None,
            incoming: None,
            backlog: VecDeque::with_capacity(backlog_capacity),
            retired_tx,
        }
    }

    /// Crossfade length in samples.
    #[must_use]
    pub fn fade_len(&self) -> usize {
        self.fade_len
    }

    /// Whether a context is currently installed.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// The live context for this block.
    pub fn active_mut(&mut self) -> Option<&mut ProcessingContext> {
        self.active.as_deref_mut()
    }

    fn retire(&mut self, ctx: Box<ProcessingContext>) {
        self.flush_backlog();
        if let Err(TrySendError::Full(ctx) | TrySendError::Disconnected(ctx)) =
            self.retired_tx.try_send(ctx)
        {
            warn!(held = self.backlog.len() + 1, "retirement queue full, backlogging context");
            self.backlog.push_back(ctx);
        }
    }

    /// Retries backlogged retirements in order. Stops at the first
    /// failed send so ordering is preserved.
    fn flush_backlog(&mut self) {
        while let Some(ctx) = self.backlog.pop_front() {
            if let Err(TrySendError::Full(ctx) | TrySendError::Disconnected(ctx)) =
                self.retired_tx.try_send(ctx)
            {
                self.backlog.push_front(ctx);
                return;
            }
        }
    }

    /// Sends a context that will never become active (failed
    /// validation) back through the retirement queue.
    pub(crate) fn retire_unused(&mut self, ctx: Box<ProcessingContext>) {
        self.retire(ctx);
    }

    /// Accepts a new context from the message queue.
    pub fn install(&mut self, ctx: Box<ProcessingContext>, mode: SwitchMode) {
        if self.active.is_none() {
            debug!("installing first context");
            self.active = Some(ctx);
            self.state = State::Direct;
            return;
        }
        match mode {
            SwitchMode::Direct => {
                debug!("direct context swap");
                if let Some(stale) = self.incoming.take() {
                    self.retire(stale);
                }
                if let Some(old) = self.active.replace(ctx) {
                    self.retire(old);
                }
                self.state = State::Direct;
            }
            SwitchMode::FadeOutIn => {
                debug!("fade switch requested");
                if let Some(stale) = self.incoming.replace(ctx) {
                    self.retire(stale);
                }
                self.state = State::FadeOutPending;
            }
        }
    }

    /// Advances the state machine at a block boundary and reports what
    /// the engine must fade during this block. The pointer swap happens
    /// here, one block after the fade-out request.
    pub fn begin_block(&mut self) -> FadePhase {
        self.flush_backlog();
        match self.state {
            State::Direct => FadePhase::None,
            State::FadeOutPending => {
                self.state = State::FadeInPending;
                FadePhase::FadeOut
            }
            State::FadeInPending => {
                self.state = State::Direct;
                if let Some(new) = self.incoming.take() {
                    debug!("swapping in faded context");
                    if let Some(old) = self.active.replace(new) {
                        self.retire(old);
                    }
                    FadePhase::FadeIn
                } else {
                    FadePhase::None
                }
            }
        }
    }
}

impl Drop for ProgramSwitcher {
    fn drop(&mut self) {
        // Contexts must go back whole; the command thread may hold
        // state keyed to them.
        while let Some(ctx) = self.backlog.pop_front() {
            let _ = self.retired_tx.try_send(ctx);
        }
        for ctx in [self.incoming.take(), self.active.take()].into_iter().flatten() {
            let _ = self.retired_tx.try_send(ctx);
        }
    }
}
