use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};

/// Where a `FailureTimer` is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    Fired,
    Cancelled,
}

#[derive(Debug)]
struct Shared {
    state: TimerState,
    deadline: Option<Instant>,
}

/// A one-shot, resettable countdown.
///
/// Once started the timer runs as its own task. Every `reset` pushes the
/// deadline to `now + timeout`; if the deadline passes without a reset the
/// expiry callback is invoked exactly once. A fired or cancelled timer is
/// finished for good, a new one has to be created to watch the member again.
///
/// Dropping the timer cancels it.
#[derive(Debug)]
pub struct FailureTimer {
    timeout: Duration,
    shared: Arc<Mutex<Shared>>,
    task: Option<JoinHandle<()>>,
}

impl FailureTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            shared: Arc::new(Mutex::new(Shared {
                state: TimerState::Idle,
                deadline: None,
            })),
            task: None,
        }
    }

    /// Arm the timer. Has no effect unless the timer is idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&mut self, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = {
            let mut shared = self.shared.lock();
            if shared.state != TimerState::Idle {
                return;
            }

            let deadline = Instant::now() + self.timeout;
            shared.state = TimerState::Armed;
            shared.deadline = Some(deadline);
            deadline
        };

        let shared = self.shared.clone();
        self.task = Some(tokio::spawn(async move {
            let mut deadline = deadline;

            loop {
                time::sleep_until(deadline).await;

                let mut guard = shared.lock();
                if guard.state != TimerState::Armed {
                    return;
                }

                match guard.deadline {
                    // Reset while we were asleep.
                    Some(pushed) if pushed > Instant::now() => deadline = pushed,
                    _ => {
                        guard.state = TimerState::Fired;
                        break;
                    }
                }
            }

            on_expire();
        }));
    }

    /// Push the deadline forward by a full timeout.
    ///
    /// Returns `false` if the timer is not armed, in which case nothing
    /// changes.
    pub fn reset(&self) -> bool {
        let mut shared = self.shared.lock();
        if shared.state != TimerState::Armed {
            return false;
        }

        shared.deadline = Some(Instant::now() + self.timeout);
        true
    }

    /// Stop the timer without firing. A timer that already fired stays fired.
    pub fn cancel(&mut self) {
        {
            let mut shared = self.shared.lock();
            if let TimerState::Idle | TimerState::Armed = shared.state {
                shared.state = TimerState::Cancelled;
            }
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn state(&self) -> TimerState {
        self.shared.lock().state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.shared.lock().deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for FailureTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
