/// Single-shot delayed task with cancel-and-reschedule semantics.
///
/// Time is supplied by the host as milliseconds on a monotonic clock. Each
/// `schedule` call supersedes the pending deadline (trailing edge), so a
/// burst of events collapses into one firing `delay_ms` after the last one.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay_ms: u64,
    due_at: Option<u64>,
}

impl Debounce {
    pub fn new(delay_ms: u64) -> Self {
        Debounce { delay_ms, due_at: None }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn schedule(&mut self, now_ms: u64) {
        self.due_at = Some(now_ms.saturating_add(self.delay_ms));
    }

    pub fn cancel(&mut self) {
        self.due_at = None;
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn due_at(&self) -> Option<u64> {
        self.due_at
    }

    /// Consume the pending task if its deadline has passed.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        match self.due_at {
            Some(due) if now_ms >= due => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }
}
