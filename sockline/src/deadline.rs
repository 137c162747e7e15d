//! Per-call timeout selection and deadline arithmetic.
//!
//! Every receive operation resolves its [`Timeout`] into an absolute bound once,
//! then recomputes the remaining slice of it before each raw read. The socket-level
//! read timeout is only ever set to that remainder, so one logical operation may
//! span many raw reads without overshooting its deadline.

use std::time::{Duration, Instant};

/// How long a receive call may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Defer to the connection's persistent timeout.
    #[default]
    Default,
    /// Block until the operation completes or the peer closes.
    Forever,
    /// Give up after this long.
    After(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::After(d)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        match d {
            Some(d) => Timeout::After(d),
            None => Timeout::Forever,
        }
    }
}

/// Absolute deadline for one receive call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Countdown {
    bound: Option<Instant>,
}

/// What is left of a [`Countdown`] at some loop iteration.
pub(crate) enum Remaining {
    Unbounded,
    Left(Duration),
    Expired,
}

impl Countdown {
    /// Start the clock for one call. `limit` is the resolved per-call timeout.
    pub(crate) fn start(limit: Option<Duration>) -> Self {
        // A limit too large to represent as an Instant is as good as none.
        Countdown {
            bound: limit.and_then(|d| Instant::now().checked_add(d)),
        }
    }

    pub(crate) fn remaining(&self) -> Remaining {
        match self.bound {
            None => Remaining::Unbounded,
            Some(bound) => match bound.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Remaining::Left(left),
                _ => Remaining::Expired,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn unbounded_countdown_never_expires() {
        let countdown = Countdown::start(None);
        assert!(matches!(countdown.remaining(), Remaining::Unbounded));
    }

    #[test]
    fn countdown_shrinks_then_expires() {
        let countdown = Countdown::start(Some(Duration::from_millis(40)));
        let first = match countdown.remaining() {
            Remaining::Left(left) => left,
            _ => panic!("fresh countdown should have time left"),
        };
        thread::sleep(Duration::from_millis(10));
        match countdown.remaining() {
            Remaining::Left(second) => assert!(second < first),
            _ => panic!("countdown expired too early"),
        }
        thread::sleep(Duration::from_millis(40));
        assert!(matches!(countdown.remaining(), Remaining::Expired));
    }

    #[test]
    fn zero_limit_is_born_expired() {
        let countdown = Countdown::start(Some(Duration::ZERO));
        assert!(matches!(countdown.remaining(), Remaining::Expired));
    }

    #[test]
    fn timeout_conversions() {
        assert_eq!(
            Timeout::from(Duration::from_secs(1)),
            Timeout::After(Duration::from_secs(1))
        );
        assert_eq!(Timeout::from(None), Timeout::Forever);
        assert_eq!(
            Timeout::from(Some(Duration::from_secs(2))),
            Timeout::After(Duration::from_secs(2))
        );
        assert_eq!(Timeout::default(), Timeout::Default);
    }
}
