//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt,
    time::{Duration, Instant},
};

/// A timer that measures and accumulates the time an operation takes.
///
/// Unlike a profiler this keeps a plain running total, so the mean over a whole evaluation run
/// can be reported at the end.
pub struct Timer {
    name: &'static str,
    total: Cell<Duration>,
    count: Cell<u32>,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            total: Cell::new(Duration::ZERO),
            count: Cell::new(0),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Returns the number of recorded measurements.
    pub fn count(&self) -> u32 {
        self.count.get()
    }

    /// Returns the mean recorded duration, or [`None`] if nothing was measured yet.
    pub fn mean(&self) -> Option<Duration> {
        match self.count.get() {
            0 => None,
            count => Some(self.total.get() / count),
        }
    }

    fn stop(&self, start: Instant) {
        self.total.set(self.total.get() + start.elapsed());
        self.count.set(self.count.get() + 1);
    }
}

/// Displays the timer name with the mean recorded time.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean_ms = self.mean().unwrap_or(Duration::ZERO).as_secs_f32() * 1000.0;
        write!(f, "{}: {}x{:.01}ms", self.name, self.count.get(), mean_ms)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    pub fn tick(&mut self) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!("{}: {} FPS", self.name, self.frames);

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_averages_measurements() {
        let timer = Timer::new("test");
        assert_eq!(timer.mean(), None);

        timer.time(|| std::thread::sleep(Duration::from_millis(1)));
        timer.time(|| std::thread::sleep(Duration::from_millis(1)));

        assert_eq!(timer.count(), 2);
        assert!(timer.mean().unwrap() >= Duration::from_millis(1));
    }

    #[test]
    fn guard_records_on_drop() {
        let timer = Timer::new("guarded");
        {
            let _guard = timer.start();
        }
        assert_eq!(timer.count(), 1);
    }
}
