//! The interrupt and deferred-work queue shared by all controllers.
//!
//! Devices request interrupts with a tick delay; entries whose delay has
//! elapsed either arm directly or, when carrying a [`Hook`], are handed back
//! to the bus so the owning device can run its late-status check (and decide
//! whether the interrupt is still wanted). Armed interrupts deliver by
//! priority level, then insertion order within a level.

/// Deferred device work, dispatched first-order by the bus.
///
/// A hook runs when its entry's delay expires; returning `true` arms the
/// interrupt at the entry's vector, `false` discards it. Hooks are how
/// controllers couple late state changes (RK11 command kickoff, LP11 done
/// latching) to interrupt eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// RK11: execute the function latched in RKCS.
    RkStart,
    /// RK11: a seek reached its cylinder; set search-complete.
    RkSeekDone,
    /// RK11: command-end interrupt, gated on IE at expiry.
    RkIntr,
    /// RL11: command-end interrupt, gated on IE at expiry.
    RlIntr,
    /// RP11: a positioning command (seek/search/recalibrate) finished.
    RpSeekDone,
    /// RP11: command-end interrupt, gated on IE at expiry.
    RpIntr,
    /// TM11: command-end interrupt, gated on IE at expiry.
    TmIntr,
    /// PC11: reader byte ready, gated on IE at expiry.
    PtrIntr,
    /// LP11: printer caught up; sets DONE and checks IE.
    LpReady,
    /// DL11: transmitter caught up; sets ready and checks IE.
    DlXmitReady,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    delay: u32,
    level: u8,
    vector: u16,
    unit: u8,
    hook: Option<Hook>,
    seq: u64,
}

/// An entry whose delay elapsed and whose hook must be run by the bus.
#[derive(Debug, Clone, Copy)]
pub struct Expired {
    pub hook: Hook,
    pub unit: u8,
    pub level: u8,
    pub vector: u16,
    seq: u64,
}

#[derive(Default)]
pub struct InterruptQueue {
    waiting: Vec<Entry>,
    armed: Vec<Entry>,
    next_seq: u64,
}

impl InterruptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    /// Enqueue a request. With `delay` 0 the entry still waits for the next
    /// [`tick`](Self::tick), so work kicked off from a register write runs
    /// after the initiating instruction has retired.
    pub fn request(&mut self, delay: u32, level: u8, vector: u16, unit: u8, hook: Option<Hook>) {
        let seq = self.seq();
        self.waiting.push(Entry {
            delay,
            level,
            vector,
            unit,
            hook,
            seq,
        });
    }

    /// Arm an interrupt for immediate delivery (no delay, no hook).
    pub fn arm(&mut self, level: u8, vector: u16) {
        let seq = self.seq();
        self.armed.push(Entry {
            delay: 0,
            level,
            vector,
            unit: 0,
            hook: None,
            seq,
        });
    }

    /// Arm a previously expired hook entry, preserving its original order.
    pub fn arm_expired(&mut self, expired: Expired) {
        self.armed.push(Entry {
            delay: 0,
            level: expired.level,
            vector: expired.vector,
            unit: expired.unit,
            hook: None,
            seq: expired.seq,
        });
    }

    /// Drop every waiting and armed entry at `vector` (the
    /// `delay = -1, unit = -1` cancellation form).
    pub fn cancel_vector(&mut self, vector: u16) {
        self.waiting.retain(|e| e.vector != vector);
        self.armed.retain(|e| e.vector != vector);
    }

    pub fn clear(&mut self) {
        self.waiting.clear();
        self.armed.clear();
    }

    /// Advance delays by one tick. Due entries without hooks arm themselves;
    /// entries with hooks are returned for the bus to run.
    pub fn tick(&mut self) -> Vec<Expired> {
        let mut expired = Vec::new();
        let mut i = 0;
        while i < self.waiting.len() {
            if self.waiting[i].delay > 0 {
                self.waiting[i].delay -= 1;
                i += 1;
                continue;
            }
            let e = self.waiting.remove(i);
            match e.hook {
                Some(hook) => expired.push(Expired {
                    hook,
                    unit: e.unit,
                    level: e.level,
                    vector: e.vector,
                    seq: e.seq,
                }),
                None => self.armed.push(e),
            }
        }
        expired
    }

    /// Take the highest-priority armed interrupt above `cpu_level`, breaking
    /// ties by insertion order.
    pub fn take_pending(&mut self, cpu_level: u8) -> Option<(u16, u8)> {
        let best = self
            .armed
            .iter()
            .enumerate()
            .filter(|(_, e)| e.level > cpu_level)
            .max_by(|(_, a), (_, b)| a.level.cmp(&b.level).then(b.seq.cmp(&a.seq)))
            .map(|(i, _)| i)?;
        let e = self.armed.remove(best);
        Some((e.vector, e.level))
    }

    /// Is anything (waiting or armed) queued at `vector`?
    pub fn is_requested(&self, vector: u16) -> bool {
        self.waiting.iter().any(|e| e.vector == vector)
            || self.armed.iter().any(|e| e.vector == vector)
    }
}
