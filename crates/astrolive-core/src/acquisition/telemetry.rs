//! Rolling per-stage timing windows.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::consts::TELEMETRY_WINDOW_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Capture,
    Save,
    Solve,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Capture, Stage::Save, Stage::Solve];

    pub fn name(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Save => "save",
            Self::Solve => "solve",
        }
    }
}

/// min / avg / max over a stage's retained samples. All zero when empty.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageSummary {
    pub samples: usize,
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}/{:.1}/{:.1}ms",
            millis(self.min),
            millis(self.avg),
            millis(self.max)
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TelemetrySummary {
    pub capture: StageSummary,
    pub save: StageSummary,
    pub solve: StageSummary,
}

impl TelemetrySummary {
    pub fn stage(&self, stage: Stage) -> &StageSummary {
        match stage {
            Stage::Capture => &self.capture,
            Stage::Save => &self.save,
            Stage::Solve => &self.solve,
        }
    }
}

impl fmt::Display for TelemetrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min/avg/max capture={} save={} solve={}",
            self.capture, self.save, self.solve
        )
    }
}

/// Bounded history of stage durations; the oldest sample is dropped first.
#[derive(Clone, Debug)]
pub struct TelemetryWindow {
    capacity: usize,
    capture: VecDeque<Duration>,
    save: VecDeque<Duration>,
    solve: VecDeque<Duration>,
}

impl Default for TelemetryWindow {
    fn default() -> Self {
        Self::new(TELEMETRY_WINDOW_LEN)
    }
}

impl TelemetryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            capture: VecDeque::with_capacity(capacity),
            save: VecDeque::with_capacity(capacity),
            solve: VecDeque::with_capacity(capacity),
        }
    }

    fn samples(&self, stage: Stage) -> &VecDeque<Duration> {
        match stage {
            Stage::Capture => &self.capture,
            Stage::Save => &self.save,
            Stage::Solve => &self.solve,
        }
    }

    pub fn record(&mut self, stage: Stage, duration: Duration) {
        let capacity = self.capacity;
        let samples = match stage {
            Stage::Capture => &mut self.capture,
            Stage::Save => &mut self.save,
            Stage::Solve => &mut self.solve,
        };
        if samples.len() == capacity {
            samples.pop_front();
        }
        samples.push_back(duration);
    }

    pub fn len(&self, stage: Stage) -> usize {
        self.samples(stage).len()
    }

    pub fn stage_summary(&self, stage: Stage) -> StageSummary {
        let samples = self.samples(stage);
        let (Some(min), Some(max)) = (samples.iter().min(), samples.iter().max()) else {
            return StageSummary::default();
        };
        let total: Duration = samples.iter().sum();
        StageSummary {
            samples: samples.len(),
            min: *min,
            avg: total / samples.len() as u32,
            max: *max,
        }
    }

    pub fn summary(&self) -> TelemetrySummary {
        TelemetrySummary {
            capture: self.stage_summary(Stage::Capture),
            save: self.stage_summary(Stage::Save),
            solve: self.stage_summary(Stage::Solve),
        }
    }
}

pub(crate) fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
