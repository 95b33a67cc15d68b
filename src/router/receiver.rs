//! Per-receiver state machines.
//!
//! Each receiver variant is a small state machine driven by two inputs: a
//! new channel level, and one of its own timers firing. Both return a
//! [`Transition`] telling the router what to emit and how to adjust the
//! receiver's timer.

use crate::constants::MAX_CLOCK_CATCH_UP;
use crate::endpoint::{Role, RoleKind, Tick};

/// What the scheduler should do with a receiver's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    /// Leave any pending timer untouched.
    Keep,
    /// Replace any pending timer with one at this tick.
    Schedule(Tick),
    /// Drop the pending timer.
    Cancel,
}

/// Result of feeding a receiver one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Level to drive the receiver's block to, if it changed.
    pub emit: Option<bool>,
    /// Timer adjustment.
    pub timer: TimerRequest,
}

impl Transition {
    const IDLE: Self = Self {
        emit: None,
        timer: TimerRequest::Keep,
    };

    const fn emit(level: bool) -> Self {
        Self {
            emit: Some(level),
            timer: TimerRequest::Keep,
        }
    }
}

/// Runtime state of one receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Plain receiver; remembers what it last drove.
    Passthrough {
        /// Last emitted level.
        last_output: Option<bool>,
    },
    /// Inverter; remembers what it last drove.
    Inverter {
        /// Last emitted level.
        last_output: Option<bool>,
    },
    /// Toggles on rising edges.
    Switch {
        /// Current output.
        toggled: bool,
        /// Previous input, for edge detection.
        last_input: bool,
    },
    /// Holds the level waiting for its timer.
    Delayer {
        /// Level to emit when the timer fires.
        pending: Option<bool>,
        /// Last input seen; a repeat of it does not restart the delay.
        last_input: Option<bool>,
    },
    /// Pulses while its input is high.
    Clock {
        /// Whether the input is currently high.
        running: bool,
        /// Current output.
        pulse: bool,
    },
}

impl ReceiverState {
    /// Fresh state for `role`, or `None` for roles that never receive.
    #[must_use]
    pub const fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Transmitter | Role::Screen => None,
            Role::Receiver => Some(Self::Passthrough { last_output: None }),
            Role::ReceiverInverter => Some(Self::Inverter { last_output: None }),
            Role::ReceiverSwitch => Some(Self::Switch {
                toggled: false,
                last_input: false,
            }),
            Role::ReceiverDelayer { .. } => Some(Self::Delayer {
                pending: None,
                last_input: None,
            }),
            Role::ReceiverClock { .. } => Some(Self::Clock {
                running: false,
                pulse: false,
            }),
        }
    }

    /// Role kind this state belongs to.
    #[must_use]
    pub const fn kind(&self) -> RoleKind {
        match self {
            Self::Passthrough { .. } => RoleKind::Receiver,
            Self::Inverter { .. } => RoleKind::ReceiverInverter,
            Self::Switch { .. } => RoleKind::ReceiverSwitch,
            Self::Delayer { .. } => RoleKind::ReceiverDelayer,
            Self::Clock { .. } => RoleKind::ReceiverClock,
        }
    }

    /// Applies a new channel level seen at tick `now`.
    ///
    /// `role` supplies the delay or period for timed receivers.
    pub fn on_input(&mut self, role: Role, level: bool, now: Tick) -> Transition {
        match self {
            Self::Passthrough { last_output } => changed(last_output, level),
            Self::Inverter { last_output } => changed(last_output, !level),
            Self::Switch {
                toggled,
                last_input,
            } => {
                let rising = level && !*last_input;
                *last_input = level;
                if rising {
                    *toggled = !*toggled;
                    Transition::emit(*toggled)
                } else {
                    Transition::IDLE
                }
            }
            Self::Delayer {
                pending,
                last_input,
            } => {
                if *last_input == Some(level) {
                    return Transition::IDLE;
                }
                *last_input = Some(level);
                *pending = Some(level);
                Transition {
                    emit: None,
                    timer: TimerRequest::Schedule(now.saturating_add(ticks(role))),
                }
            }
            Self::Clock { running, pulse } => {
                if level {
                    if *running {
                        return Transition::IDLE;
                    }
                    *running = true;
                    *pulse = false;
                    Transition {
                        emit: None,
                        timer: TimerRequest::Schedule(now.saturating_add(ticks(role))),
                    }
                } else {
                    *running = false;
                    *pulse = false;
                    Transition {
                        emit: Some(false),
                        timer: TimerRequest::Cancel,
                    }
                }
            }
        }
    }

    /// Applies this receiver's timer firing at `fire_at` while time is being
    /// advanced to `until`.
    ///
    /// A clock more than [`MAX_CLOCK_CATCH_UP`] periods behind `until` skips
    /// the missed pulses and emits only the level it would have ended on.
    pub fn on_timer(&mut self, role: Role, fire_at: Tick, until: Tick) -> Transition {
        match self {
            Self::Delayer { pending, .. } => {
                pending.take().map_or(Transition::IDLE, Transition::emit)
            }
            Self::Clock { running, pulse } if *running => {
                let period = ticks(role).max(1);
                let missed = until.saturating_sub(fire_at) / period;
                let skipped = if missed > MAX_CLOCK_CATCH_UP { missed } else { 0 };
                if skipped % 2 == 0 {
                    *pulse = !*pulse;
                }
                let last = fire_at.saturating_add(skipped.saturating_mul(period));
                let next = last.saturating_add(period);
                Transition {
                    emit: Some(*pulse),
                    timer: if next > last {
                        TimerRequest::Schedule(next)
                    } else {
                        TimerRequest::Cancel
                    },
                }
            }
            _ => Transition::IDLE,
        }
    }
}

fn changed(last_output: &mut Option<bool>, output: bool) -> Transition {
    if *last_output == Some(output) {
        return Transition::IDLE;
    }
    *last_output = Some(output);
    Transition::emit(output)
}

fn ticks(role: Role) -> Tick {
    role.delay().map_or(0, Tick::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DELAYER: Role = Role::ReceiverDelayer { delay: 50 };
    const CLOCK: Role = Role::ReceiverClock { period: 100 };

    fn state(role: Role) -> ReceiverState {
        ReceiverState::for_role(role).expect("role receives signals")
    }

    #[rstest]
    #[case(Role::Receiver, true, true)]
    #[case(Role::Receiver, false, false)]
    #[case(Role::ReceiverInverter, true, false)]
    #[case(Role::ReceiverInverter, false, true)]
    fn immediate_receivers_emit_once(#[case] role: Role, #[case] input: bool, #[case] out: bool) {
        let mut receiver = state(role);
        assert_eq!(receiver.on_input(role, input, 0).emit, Some(out));
        assert_eq!(receiver.on_input(role, input, 1).emit, None);
    }

    #[rstest]
    fn switch_toggles_on_rising_edges_only() {
        let role = Role::ReceiverSwitch;
        let mut switch = state(role);
        let outputs: Vec<_> = [true, false, true, true, false, true]
            .into_iter()
            .enumerate()
            .map(|(tick, level)| switch.on_input(role, level, tick as Tick).emit)
            .collect();
        assert_eq!(
            outputs,
            vec![Some(true), None, Some(false), None, None, Some(true)]
        );
    }

    #[rstest]
    fn delayer_keeps_latest_level() {
        let mut delayer = state(DELAYER);
        let first = delayer.on_input(DELAYER, true, 0);
        assert_eq!(first.timer, TimerRequest::Schedule(50));
        let second = delayer.on_input(DELAYER, false, 10);
        assert_eq!(second.timer, TimerRequest::Schedule(60));
        assert_eq!(delayer.on_timer(DELAYER, 60, 60).emit, Some(false));
        assert_eq!(delayer.on_timer(DELAYER, 61, 61), Transition::IDLE);
    }

    #[rstest]
    fn delayer_ignores_repeated_level() {
        let mut delayer = state(DELAYER);
        assert_eq!(
            delayer.on_input(DELAYER, true, 0).timer,
            TimerRequest::Schedule(50)
        );
        assert_eq!(delayer.on_input(DELAYER, true, 40), Transition::IDLE);
        assert_eq!(delayer.on_timer(DELAYER, 50, 50).emit, Some(true));
        assert_eq!(delayer.on_input(DELAYER, true, 70), Transition::IDLE);
    }

    #[rstest]
    fn clock_pulses_until_input_drops() {
        let mut clock = state(CLOCK);
        assert_eq!(
            clock.on_input(CLOCK, true, 0).timer,
            TimerRequest::Schedule(100)
        );
        assert_eq!(clock.on_input(CLOCK, true, 5), Transition::IDLE);
        let first = clock.on_timer(CLOCK, 100, 100);
        assert_eq!(first.emit, Some(true));
        assert_eq!(first.timer, TimerRequest::Schedule(200));
        assert_eq!(clock.on_timer(CLOCK, 200, 200).emit, Some(false));
        let stop = clock.on_input(CLOCK, false, 250);
        assert_eq!(stop.emit, Some(false));
        assert_eq!(stop.timer, TimerRequest::Cancel);
        assert_eq!(clock.on_timer(CLOCK, 300, 300), Transition::IDLE);
    }

    #[rstest]
    #[case(100 + 100 * (MAX_CLOCK_CATCH_UP + 1), Some(false), 100 + 100 * (MAX_CLOCK_CATCH_UP + 2))]
    #[case(100 + 100 * (MAX_CLOCK_CATCH_UP + 2), Some(true), 100 + 100 * (MAX_CLOCK_CATCH_UP + 3))]
    fn far_behind_clock_skips_to_final_parity(
        #[case] until: Tick,
        #[case] emit: Option<bool>,
        #[case] next: Tick,
    ) {
        let mut clock = state(CLOCK);
        clock.on_input(CLOCK, true, 0);
        let caught_up = clock.on_timer(CLOCK, 100, until);
        assert_eq!(caught_up.emit, emit);
        assert_eq!(caught_up.timer, TimerRequest::Schedule(next));
    }

    #[rstest]
    fn clock_at_end_of_time_stops_rescheduling() {
        let mut clock = state(CLOCK);
        clock.on_input(CLOCK, true, Tick::MAX - 10);
        assert_eq!(
            clock.on_timer(CLOCK, Tick::MAX, Tick::MAX).timer,
            TimerRequest::Cancel
        );
    }

    #[rstest]
    #[case(Role::Transmitter)]
    #[case(Role::Screen)]
    fn non_receivers_have_no_state(#[case] role: Role) {
        assert!(ReceiverState::for_role(role).is_none());
    }
}
