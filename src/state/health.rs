use tokio::sync::watch;

/// Observable "store unreachable" flag shared by the supervisor and its readers.
pub struct HealthFlag {
    degraded: watch::Sender<bool>,
}

impl HealthFlag {
    /// Start healthy (`false`) or degraded (`true`).
    pub fn new(degraded: bool) -> Self {
        let (degraded, _rx) = watch::channel(degraded);
        Self { degraded }
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the flag, notifying watchers only when it flips. Returns whether it flipped.
    pub fn set(&self, degraded: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == degraded {
                false
            } else {
                *current = degraded;
                true
            }
        })
    }
}
