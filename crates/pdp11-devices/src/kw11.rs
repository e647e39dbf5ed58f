//! KW11 line clock: 50 Hz, vector 0o100, priority 6.
//!
//! The embedder polls with its monotonic clock. Each tick advances the next
//! deadline by one period so the average rate stays at 50 Hz even when polls
//! are late; a gap over 30 seconds (a paused emulator) resets the deadline
//! instead of replaying the backlog.

use crate::interrupts::InterruptQueue;

pub const KW11_VECTOR: u16 = 0o100;
pub const KW11_LEVEL: u8 = 6;

const LKS_IE: u16 = 0o100;
const LKS_DONE: u16 = 0o200;

pub const PERIOD_MS: u64 = 20;
const RESYNC_MS: u64 = 30_000;

pub struct Kw11 {
    pub lks: u16,
    deadline_ms: Option<u64>,
}

impl Kw11 {
    pub fn new() -> Self {
        Self {
            lks: 0,
            deadline_ms: None,
        }
    }

    pub fn reset(&mut self) {
        self.lks = 0;
        self.deadline_ms = None;
    }

    pub fn peek(&self) -> u16 {
        self.lks
    }

    pub fn read(&mut self) -> u16 {
        self.lks
    }

    /// Any write clears the monitor bit; only IE is retained.
    pub fn write(&mut self, value: u16) {
        self.lks = value & LKS_IE;
    }

    /// Advance the clock. Returns `true` when a tick fired.
    pub fn poll(&mut self, now_ms: u64, halted: bool, irq: &mut InterruptQueue) -> bool {
        let deadline = match self.deadline_ms {
            None => {
                self.deadline_ms = Some(now_ms + PERIOD_MS);
                return false;
            }
            Some(d) => d,
        };
        if now_ms < deadline {
            return false;
        }

        let mut next = deadline + PERIOD_MS;
        if now_ms.saturating_sub(next) > RESYNC_MS {
            next = now_ms + PERIOD_MS;
        }
        self.deadline_ms = Some(next);

        if !halted {
            self.lks |= LKS_DONE;
            if self.lks & LKS_IE != 0 {
                irq.arm(KW11_LEVEL, KW11_VECTOR);
            }
        }
        true
    }
}

impl Default for Kw11 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ticks_at_the_period_and_catches_up() {
        let mut kw = Kw11::new();
        let mut irq = InterruptQueue::new();

        assert!(!kw.poll(0, false, &mut irq)); // arming poll
        assert!(!kw.poll(10, false, &mut irq));
        assert!(kw.poll(20, false, &mut irq));
        assert_eq!(kw.lks & LKS_DONE, LKS_DONE);

        // A late poll still fires and the deadline stays on the 20ms grid.
        assert!(kw.poll(55, false, &mut irq));
        assert!(kw.poll(60, false, &mut irq));
    }

    #[test]
    fn long_pause_resynchronizes() {
        let mut kw = Kw11::new();
        let mut irq = InterruptQueue::new();
        kw.poll(0, false, &mut irq);
        kw.poll(20, false, &mut irq);

        // After a 60s pause the deadline jumps forward instead of firing
        // thousands of catch-up ticks.
        assert!(kw.poll(60_040, false, &mut irq));
        assert!(!kw.poll(60_041, false, &mut irq));
        assert!(kw.poll(60_060, false, &mut irq));
    }

    #[test]
    fn halted_cpu_suppresses_the_monitor_bit() {
        let mut kw = Kw11::new();
        let mut irq = InterruptQueue::new();
        kw.poll(0, false, &mut irq);
        assert!(kw.poll(20, true, &mut irq));
        assert_eq!(kw.lks, 0);
    }

    #[test]
    fn interrupt_only_when_enabled() {
        let mut kw = Kw11::new();
        let mut irq = InterruptQueue::new();
        kw.poll(0, false, &mut irq);
        kw.poll(20, false, &mut irq);
        assert_eq!(irq.take_pending(0), None);

        kw.write(LKS_IE);
        kw.poll(40, false, &mut irq);
        assert_eq!(irq.take_pending(0), Some((KW11_VECTOR, KW11_LEVEL)));
    }
}
