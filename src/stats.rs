//! Aggregate performance figures.
//!
//! Everything is accumulated from exact integer tick counts; the ratios are
//! only rounded when a summary is printed.

use std::fmt;

use average::{Estimate, Mean, Variance};

use crate::core::{Ticks, Workload};

#[derive(Debug)]
pub struct PerfStats {
    busy_ticks: Ticks,
    finished: usize,
    wta: Variance,
    wait: Mean,
}

impl Default for PerfStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PerfStats {
    pub fn new() -> Self {
        Self {
            busy_ticks: 0,
            finished: 0,
            wta: Variance::new(),
            wait: Mean::new(),
        }
    }

    pub fn record_busy_tick(&mut self) {
        self.busy_ticks += 1;
    }

    pub fn record_finished(&mut self, workload: &Workload) {
        self.finished += 1;
        self.wait.add(workload.wait_time as f64);
        if let Some(wta) = workload.weighted_turnaround {
            self.wta.add(wta);
        }
    }

    pub fn summarize(&self, elapsed: Ticks) -> PerfSummary {
        let cpu_utilization = if elapsed == 0 {
            0.0
        } else {
            self.busy_ticks as f64 / elapsed as f64 * 100.0
        };
        let (avg_wta, std_wta) = if self.wta.is_empty() {
            (0.0, 0.0)
        } else {
            (self.wta.mean(), self.wta.population_variance().sqrt())
        };
        let avg_wait = if self.finished == 0 {
            0.0
        } else {
            self.wait.estimate()
        };

        PerfSummary {
            elapsed_ticks: elapsed,
            busy_ticks: self.busy_ticks,
            finished: self.finished,
            cpu_utilization,
            avg_wta,
            avg_wait,
            std_wta,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerfSummary {
    pub elapsed_ticks: Ticks,
    pub busy_ticks: Ticks,
    pub finished: usize,
    /// Percent of elapsed ticks spent running a workload.
    pub cpu_utilization: f64,
    pub avg_wta: f64,
    pub avg_wait: f64,
    /// Population standard deviation.
    pub std_wta: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl fmt::Display for PerfSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CPU utilization = {:.2}%", round2(self.cpu_utilization))?;
        writeln!(f, "Avg WTA = {:.2}", round2(self.avg_wta))?;
        writeln!(f, "Avg Waiting = {:.2}", round2(self.avg_wait))?;
        write!(f, "Std WTA = {:.2}", round2(self.std_wta))
    }
}
