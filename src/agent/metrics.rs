//! Per-step timings collected by the agent.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Timings of one agent step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepMetrics {
    pub step: u32,
    pub action: Option<String>,
    pub screenshot: Duration,
    pub inference: Duration,
    pub execution: Duration,
    pub total: Duration,
}

impl fmt::Display for StepMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step {} ({}): screenshot={:.1}ms, inference={:.1}ms, execution={:.1}ms, total={:.1}ms",
            self.step,
            self.action.as_deref().unwrap_or("-"),
            millis(self.screenshot),
            millis(self.inference),
            millis(self.execution),
            millis(self.total),
        )
    }
}

/// Average step timings in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Averages {
    pub screenshot_ms: f64,
    pub inference_ms: f64,
    pub execution_ms: f64,
}

/// Metrics for one `run`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub steps: Vec<StepMetrics>,
    pub total: Duration,
    #[serde(skip)]
    started: Option<Instant>,
}

impl SessionMetrics {
    pub fn start(&mut self) {
        self.steps.clear();
        self.total = Duration::ZERO;
        self.started = Some(Instant::now());
    }

    pub fn add_step(&mut self, step: StepMetrics) {
        tracing::debug!("{}", step);
        self.steps.push(step);
    }

    pub fn finalize(&mut self) {
        if let Some(started) = self.started.take() {
            self.total = started.elapsed();
        }
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn averages(&self) -> Option<Averages> {
        if self.steps.is_empty() {
            return None;
        }
        let n = self.steps.len() as f64;
        let avg = |f: fn(&StepMetrics) -> Duration| {
            self.steps.iter().map(|s| millis(f(s))).sum::<f64>() / n
        };
        Some(Averages {
            screenshot_ms: avg(|s| s.screenshot),
            inference_ms: avg(|s| s.inference),
            execution_ms: avg(|s| s.execution),
        })
    }

    /// Log a one-line summary.
    pub fn log_summary(&self) {
        let averages = self.averages().unwrap_or_default();
        tracing::info!(
            steps = self.total_steps(),
            total_s = self.total.as_secs_f64(),
            avg_screenshot_ms = averages.screenshot_ms,
            avg_inference_ms = averages.inference_ms,
            avg_execution_ms = averages.execution_ms,
            "Session metrics"
        );
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, ms: u64) -> StepMetrics {
        StepMetrics {
            step: n,
            action: Some("Tap".to_string()),
            screenshot: Duration::from_millis(ms),
            inference: Duration::from_millis(ms * 10),
            execution: Duration::from_millis(ms * 2),
            total: Duration::from_millis(ms * 13),
        }
    }

    #[test]
    fn test_averages() {
        let mut session = SessionMetrics::default();
        assert!(session.averages().is_none());

        session.start();
        session.add_step(step(1, 10));
        session.add_step(step(2, 30));
        session.finalize();

        let avg = session.averages().unwrap();
        assert_eq!(session.total_steps(), 2);
        assert!((avg.screenshot_ms - 20.0).abs() < 1e-9);
        assert!((avg.inference_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_display() {
        let text = step(3, 1).to_string();
        assert!(text.starts_with("Step 3 (Tap): screenshot=1.0ms"));
    }
}
