//! Search requests that arrive before the dataset is loaded.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatePhase {
    Idle,
    AwaitingData,
    Ready,
}

/// `Idle -> AwaitingData -> Ready` with a single pending slot. A request made
/// before `Ready` replaces whatever was pending and runs once data arrives.
#[derive(Debug, Clone)]
pub struct SearchGate<T> {
    phase: GatePhase,
    pending: Option<T>,
}

impl<T> Default for SearchGate<T> {
    fn default() -> Self { Self { phase: GatePhase::Idle, pending: None } }
}

impl<T> SearchGate<T> {
    pub fn new() -> Self { Self::default() }

    pub fn phase(&self) -> GatePhase { self.phase }
    pub fn pending(&self) -> Option<&T> { self.pending.as_ref() }

    /// A (re)fetch started; later requests are deferred until `data_ready`.
    pub fn begin_load(&mut self) { self.phase = GatePhase::AwaitingData; }

    /// `Some(req)` when it may run now, otherwise it is parked.
    pub fn request(&mut self, req: T) -> Option<T> {
        match self.phase {
            GatePhase::Ready => Some(req),
            GatePhase::Idle | GatePhase::AwaitingData => {
                self.pending = Some(req);
                None
            }
        }
    }

    /// Data arrived (or failed to); hands back the parked request, if any.
    pub fn data_ready(&mut self) -> Option<T> {
        self.phase = GatePhase::Ready;
        self.pending.take()
    }
}
