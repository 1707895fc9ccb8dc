//! Completion detection for one invocation.
//!
//! A process reports its end twice: once when it exits and once when its output streams close.
//! Either notification may come first, either may be the only one, and both race with the last
//! output chunks. [`CompletionDetector`] reconciles them into a single finalize decision:
//!
//! ```text
//!                      first signal, output buffered
//!  WaitingFirstSignal ───────────────────────────────► Done
//!         │                                             ▲
//!         │ first signal, nothing buffered              │ grace elapsed
//!         ▼                                             │ or second signal
//!    DeferredGrace ─────────────────────────────────────┘
//! ```
//!
//! The detector is a pure state machine; the caller owns the grace timer and feeds it events.
use gitrun_model::ExitCodePolicy;

/// The two termination notifications a process produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process closed its output streams.
    Close,
    /// The process exited.
    Exit,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Close => "close",
            Termination::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    WaitingFirstSignal,
    DeferredGrace,
    Done,
}

/// What the caller has to do after feeding an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do.
    None,
    /// Arm the grace timer and report back through [`CompletionDetector::on_grace_elapsed`].
    Defer,
    /// The invocation is complete.
    Finalize { exit_code: i32 },
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    state: DetectorState,
    policy: ExitCodePolicy,
    has_output: bool,
    first_code: Option<i32>,
    latest_code: Option<i32>,
}

impl CompletionDetector {
    pub fn new(policy: ExitCodePolicy) -> Self {
        Self {
            state: DetectorState::WaitingFirstSignal,
            policy,
            has_output: false,
            first_code: None,
            latest_code: None,
        }
    }

    #[inline]
    pub fn state(&self) -> DetectorState {
        self.state
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == DetectorState::Done
    }

    /// Record that `len` bytes arrived on stdout or stderr.
    ///
    /// Output never finalizes by itself; while deferred, the grace timer (or the second signal)
    /// still decides.
    pub fn on_output(&mut self, len: usize) {
        if len > 0 {
            self.has_output = true;
        }
    }

    pub fn on_termination(&mut self, _signal: Termination, exit_code: i32) -> Transition {
        match self.state {
            DetectorState::Done => Transition::None,
            DetectorState::WaitingFirstSignal => {
                self.first_code = Some(exit_code);
                self.latest_code = Some(exit_code);
                if self.has_output {
                    self.finalize()
                } else {
                    self.state = DetectorState::DeferredGrace;
                    Transition::Defer
                }
            }
            DetectorState::DeferredGrace => {
                self.latest_code = Some(exit_code);
                self.finalize()
            }
        }
    }

    pub fn on_grace_elapsed(&mut self) -> Transition {
        match self.state {
            DetectorState::DeferredGrace => self.finalize(),
            _ => Transition::None,
        }
    }

    fn finalize(&mut self) -> Transition {
        self.state = DetectorState::Done;
        let code = match self.policy {
            ExitCodePolicy::First => self.first_code.or(self.latest_code),
            ExitCodePolicy::Latest => self.latest_code.or(self.first_code),
        };
        Transition::Finalize {
            exit_code: code.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> CompletionDetector {
        CompletionDetector::new(ExitCodePolicy::First)
    }

    #[test]
    fn output_before_first_signal_finalizes_immediately() {
        let mut d = detector();
        d.on_output(12);
        assert_eq!(
            d.on_termination(Termination::Exit, 0),
            Transition::Finalize { exit_code: 0 }
        );
        assert!(d.is_done());
    }

    #[test]
    fn close_may_arrive_first() {
        let mut d = detector();
        d.on_output(1);
        assert_eq!(
            d.on_termination(Termination::Close, 1),
            Transition::Finalize { exit_code: 1 }
        );
        assert_eq!(d.on_termination(Termination::Exit, 1), Transition::None);
    }

    #[test]
    fn silent_first_signal_defers() {
        let mut d = detector();
        assert_eq!(d.on_termination(Termination::Exit, 128), Transition::Defer);
        assert_eq!(d.state(), DetectorState::DeferredGrace);

        d.on_output(40);
        assert_eq!(d.state(), DetectorState::DeferredGrace, "output alone does not finalize");

        assert_eq!(d.on_grace_elapsed(), Transition::Finalize { exit_code: 128 });
        assert_eq!(d.on_grace_elapsed(), Transition::None);
    }

    #[test]
    fn lone_signal_without_output_finalizes_after_grace() {
        let mut d = detector();
        assert_eq!(d.on_termination(Termination::Close, 0), Transition::Defer);
        assert_eq!(d.on_grace_elapsed(), Transition::Finalize { exit_code: 0 });
    }

    #[test]
    fn second_signal_during_grace_finalizes_once() {
        let mut d = detector();
        assert_eq!(d.on_termination(Termination::Exit, 1), Transition::Defer);
        assert_eq!(
            d.on_termination(Termination::Close, 1),
            Transition::Finalize { exit_code: 1 }
        );
        assert_eq!(d.on_grace_elapsed(), Transition::None);
        assert_eq!(d.on_termination(Termination::Close, 1), Transition::None);
    }

    #[test]
    fn exit_code_policy_breaks_disagreements() {
        let mut first = CompletionDetector::new(ExitCodePolicy::First);
        first.on_termination(Termination::Exit, 2);
        assert_eq!(
            first.on_termination(Termination::Close, 0),
            Transition::Finalize { exit_code: 2 }
        );

        let mut latest = CompletionDetector::new(ExitCodePolicy::Latest);
        latest.on_termination(Termination::Exit, 2);
        assert_eq!(
            latest.on_termination(Termination::Close, 0),
            Transition::Finalize { exit_code: 0 }
        );
    }

    #[test]
    fn grace_before_any_signal_is_ignored() {
        let mut d = detector();
        assert_eq!(d.on_grace_elapsed(), Transition::None);
        assert_eq!(d.state(), DetectorState::WaitingFirstSignal);
    }

    #[test]
    fn empty_chunks_do_not_count_as_output() {
        let mut d = detector();
        d.on_output(0);
        assert_eq!(d.on_termination(Termination::Exit, 0), Transition::Defer);
    }
}
