//! Edge detection on TTL pulse traces.
//!
//! A trace is thresholded into on/off states (`sign(sample - threshold)`); a
//! rising edge is the first frame of an increase, a falling edge the first
//! frame of a decrease. A sample exactly on the threshold counts as its own
//! state, so a ramp through the threshold reports one edge per step.

/// Frames at which a trace changes state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlEdges {
    /// Frames starting an increase
    pub rising: Vec<u64>,
    /// Frames starting a decrease
    pub falling: Vec<u64>,
}

impl TtlEdges {
    /// Rising and falling frames merged in frame order.
    pub fn frames(&self) -> Vec<u64> {
        let mut frames = [self.rising.as_slice(), self.falling.as_slice()].concat();
        frames.sort_unstable();
        frames
    }

    /// Merged event times in seconds.
    pub fn times(&self, sampling_rate: f64, starting_time: f64) -> Vec<f64> {
        self.frames()
            .into_iter()
            .map(|frame| starting_time + frame as f64 / sampling_rate)
            .collect()
    }
}

/// How a channel is read as a TTL trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TtlSignal {
    /// Analog level, thresholded at the given value or the channel mean
    Analog {
        /// Threshold; the trace mean when `None`
        threshold: Option<f64>,
    },
    /// One bit (0-15) of a digital word channel
    DigitalLine(u8),
}

/// Incremental edge detector fed with consecutive blocks of one trace.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    threshold: f64,
    previous: Option<i8>,
    frame: u64,
    edges: TtlEdges,
}

impl EdgeDetector {
    /// A detector with a fixed threshold.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
            frame: 0,
            edges: TtlEdges::default(),
        }
    }

    /// Feed the next samples of the trace.
    pub fn push<I: IntoIterator<Item = f64>>(&mut self, samples: I) {
        for sample in samples {
            let state = sign(sample - self.threshold);
            match self.previous {
                Some(previous) if state > previous => self.edges.rising.push(self.frame),
                Some(previous) if state < previous => self.edges.falling.push(self.frame),
                _ => {}
            }
            self.previous = Some(state);
            self.frame += 1;
        }
    }

    /// Edges found so far.
    pub fn finish(self) -> TtlEdges {
        self.edges
    }
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

fn mean(trace: &[f64]) -> f64 {
    trace.iter().sum::<f64>() / trace.len() as f64
}

/// Edges of an in-memory trace; the threshold defaults to the trace mean.
pub fn detect_edges(trace: &[f64], threshold: Option<f64>) -> TtlEdges {
    if trace.is_empty() {
        return TtlEdges::default();
    }
    let mut detector = EdgeDetector::new(threshold.unwrap_or_else(|| mean(trace)));
    detector.push(trace.iter().copied());
    detector.finish()
}

/// Frames of rising edges.
pub fn rising_frames(trace: &[f64], threshold: Option<f64>) -> Vec<u64> {
    detect_edges(trace, threshold).rising
}

/// Frames of falling edges.
pub fn falling_frames(trace: &[f64], threshold: Option<f64>) -> Vec<u64> {
    detect_edges(trace, threshold).falling
}
