//! Per-step output records and the sinks that consume them.

use crate::control::Statistics;
use crate::lane::HALTING_SPEED;
#[cfg(feature = "serde")]
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// The state of a running vehicle at the end of a step.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct VehicleRecord {
    pub id: String,
    pub lane: String,
    /// The position of the vehicle's front along the lane in m.
    pub pos: f64,
    pub speed: f64,
    /// The world coordinates of the vehicle's front.
    pub x: f64,
    pub y: f64,
}

/// Everything reported at the end of a step.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StepOutput {
    /// The simulation time at the end of the step in s.
    pub time: f64,
    /// The vehicles on the road, lane by lane.
    pub vehicles: Vec<VehicleRecord>,
    pub stats: Statistics,
}

/// A consumer of step outputs.
pub trait OutputSink {
    /// Receives the output of one step.
    fn write_step(&mut self, output: &StepOutput) -> std::io::Result<()>;

    /// Called once when the run ends.
    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<T: OutputSink> OutputSink for Rc<RefCell<T>> {
    fn write_step(&mut self, output: &StepOutput) -> std::io::Result<()> {
        self.borrow_mut().write_step(output)
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.borrow_mut().finish()
    }
}

/// One line of the network-wide summary.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SummaryRow {
    pub time: f64,
    /// The mean speed of the vehicles on the road, if any.
    pub mean_speed: Option<f64>,
    /// The number of vehicles slower than the halting threshold.
    pub halting: usize,
    pub stats: Statistics,
}

/// Collects a [SummaryRow] per step.
#[derive(Clone, Debug, Default)]
pub struct SummaryCollector {
    rows: Vec<SummaryRow>,
}

impl SummaryCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Default::default()
    }

    /// Gets the rows collected so far.
    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    /// Gets the most recent row.
    pub fn last(&self) -> Option<&SummaryRow> {
        self.rows.last()
    }
}

impl OutputSink for SummaryCollector {
    fn write_step(&mut self, output: &StepOutput) -> std::io::Result<()> {
        let count = output.vehicles.len();
        let mean_speed = (count > 0).then(|| output.vehicles.iter().map(|v| v.speed).sum::<f64>() / count as f64);
        let halting = output.vehicles.iter().filter(|v| v.speed < HALTING_SPEED).count();
        self.rows.push(SummaryRow {
            time: output.time,
            mean_speed,
            halting,
            stats: output.stats.clone(),
        });
        Ok(())
    }
}

/// Writes every step output as one line of JSON.
#[cfg(feature = "serde")]
pub struct JsonLinesWriter<W: std::io::Write> {
    writer: W,
}

#[cfg(feature = "serde")]
impl JsonLinesWriter<std::io::BufWriter<std::fs::File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(std::io::BufWriter::new(file)))
    }
}

#[cfg(feature = "serde")]
impl<W: std::io::Write> JsonLinesWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Gets the underlying writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(feature = "serde")]
impl<W: std::io::Write> OutputSink for JsonLinesWriter<W> {
    fn write_step(&mut self, output: &StepOutput) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, output)?;
        self.writer.write_all(b"\n")
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
