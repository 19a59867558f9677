use chrono::{DateTime, Local};

/// Wall-clock source for timestamps and the numbering day.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Starts at a fixed instant and moves one second forward on every read, so
/// successive audit entries get distinct, ordered timestamps.
#[cfg(test)]
pub struct TickingClock {
    base: DateTime<Local>,
    ticks: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl TickingClock {
    pub fn starting_at(base: DateTime<Local>) -> Self {
        Self {
            base,
            ticks: std::sync::atomic::AtomicI64::new(0),
        }
    }
}

#[cfg(test)]
impl Clock for TickingClock {
    fn now(&self) -> DateTime<Local> {
        let tick = self.ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.base + chrono::Duration::seconds(tick)
    }
}
