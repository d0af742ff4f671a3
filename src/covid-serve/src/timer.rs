use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

/// Wall-clock timer for one pipeline stage. Start and stop are logged.
pub struct Timer {
    stage: String,
    started: Option<DateTime<Utc>>,
    elapsed: Option<Duration>,
}

impl Timer {
    pub fn new(stage: &str) -> Self {
        Timer {
            stage: stage.to_owned(),
            started: None,
            elapsed: None,
        }
    }

    pub fn new_start(stage: &str) -> Self {
        let mut t = Timer::new(stage);
        t.start();
        t
    }

    pub fn start(&mut self) {
        info!("{}: starting", self.stage);

        self.started = Some(Utc::now());
        self.elapsed = None;
    }

    /// Stop the timer and return the elapsed milliseconds
    pub fn stop(&mut self) -> i64 {
        match self.started.take() {
            None => debug!("{}: not running!", self.stage),
            Some(started) => {
                let d = Utc::now() - started;

                self.elapsed = Some(d);
                info!("{} took {} msec", self.stage, d.num_milliseconds());
            }
        }

        self.millis()
    }

    /// Milliseconds measured by the last `stop`, zero if never stopped
    pub fn millis(&self) -> i64 {
        self.elapsed.map_or(0, |d| d.num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;

    #[test]
    fn unstarted_timer_reports_zero() {
        let mut t = Timer::new("idle");
        assert_eq!(t.stop(), 0);
        assert_eq!(t.millis(), 0);
    }

    #[test]
    fn restart_clears_previous_measurement() {
        let mut t = Timer::new_start("stage");
        t.stop();
        assert!(t.millis() >= 0);

        t.start();
        assert_eq!(t.millis(), 0);
        assert!(t.stop() >= 0);
    }
}
