//! Append-only traces: scheduling transitions, memory operations and the
//! closing performance summary.
//!
//! Every record is kept in memory; when the configuration names files the
//! same records are also written out one line each.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{
    config::SimConfig,
    core::{MemoryEvent, SchedEvent},
    error::Result,
    stats::PerfSummary,
};

const SCHEDULER_HEADER: &str = "#At time x process y state arr w total z remain y wait k";
const MEMORY_HEADER: &str = "#At time x allocated y bytes for process z from i to j";

#[derive(Debug, Clone, PartialEq)]
pub enum TraceRecord {
    Sched(SchedEvent),
    Memory(MemoryEvent),
    Summary(PerfSummary),
}

struct LineLog {
    out: BufWriter<Box<dyn Write + Send>>,
}

impl LineLog {
    fn new(out: Box<dyn Write + Send>, header: Option<&str>) -> Result<Self> {
        let mut log = Self {
            out: BufWriter::new(out),
        };
        if let Some(header) = header {
            writeln!(log.out, "{header}")?;
        }
        Ok(log)
    }

    fn create(path: &Path, header: Option<&str>) -> Result<Self> {
        Self::new(Box::new(File::create(path)?), header)
    }
}

#[derive(Default)]
pub struct Trace {
    records: Vec<TraceRecord>,
    scheduler: Option<LineLog>,
    memory: Option<LineLog>,
    perf: Option<LineLog>,
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("records", &self.records.len())
            .field("scheduler", &self.scheduler.is_some())
            .field("memory", &self.memory.is_some())
            .field("perf", &self.perf.is_some())
            .finish()
    }
}

impl Trace {
    /// Opens (truncating) whichever log files the configuration names.
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        let mut trace = Self::default();
        if let Some(path) = &config.scheduler_log {
            trace.scheduler = Some(LineLog::create(path, Some(SCHEDULER_HEADER))?);
        }
        if let Some(path) = &config.memory_log {
            trace.memory = Some(LineLog::create(path, Some(MEMORY_HEADER))?);
        }
        if let Some(path) = &config.perf_log {
            trace.perf = Some(LineLog::create(path, None)?);
        }
        Ok(trace)
    }

    pub fn record_sched(&mut self, event: &SchedEvent) -> Result<()> {
        if let Some(log) = &mut self.scheduler {
            writeln!(log.out, "{event}")?;
        }
        self.records.push(TraceRecord::Sched(event.clone()));
        Ok(())
    }

    pub fn record_memory(&mut self, event: &MemoryEvent) -> Result<()> {
        if let Some(log) = &mut self.memory {
            writeln!(log.out, "{event}")?;
        }
        self.records.push(TraceRecord::Memory(*event));
        Ok(())
    }

    pub fn record_summary(&mut self, summary: &PerfSummary) -> Result<()> {
        if let Some(log) = &mut self.perf {
            writeln!(log.out, "{summary}")?;
        }
        self.records.push(TraceRecord::Summary(summary.clone()));
        Ok(())
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn sched_events(&self) -> impl Iterator<Item = &SchedEvent> {
        self.records.iter().filter_map(|r| match r {
            TraceRecord::Sched(event) => Some(event),
            _ => None,
        })
    }

    pub fn memory_events(&self) -> impl Iterator<Item = &MemoryEvent> {
        self.records.iter().filter_map(|r| match r {
            TraceRecord::Memory(event) => Some(event),
            _ => None,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        for log in [&mut self.scheduler, &mut self.memory, &mut self.perf]
            .into_iter()
            .flatten()
        {
            log.out.flush()?;
        }
        Ok(())
    }

    /// Flushes and drops the writers. In-memory records stay readable.
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        self.scheduler = None;
        self.memory = None;
        self.perf = None;
        flushed
    }
}
