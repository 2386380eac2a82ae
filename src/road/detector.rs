use crate::lane::LaneSegment;

/// The default aggregation interval of detectors and sinks, in s.
pub const AGGREGATION_INTERVAL: f64 = 60.0;

/// A cross-section counter at a fixed position, covering all lanes.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopDetector {
    position: f64,
    count: usize,
    speed_sum: f64,
    elapsed: f64,
    /// The flow of the last completed interval, in veh/h.
    flow: f64,
    /// The mean speed of the last completed interval, in m/s.
    mean_speed: Option<f64>,
    total: u64,
}

impl LoopDetector {
    pub fn new(position: f64) -> Self {
        Self {
            position,
            count: 0,
            speed_sum: 0.0,
            elapsed: 0.0,
            flow: 0.0,
            mean_speed: None,
            total: 0,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// The flow of the last completed interval, in veh/h.
    pub fn flow(&self) -> f64 {
        self.flow
    }

    /// The mean speed of the last completed interval, in m/s.
    pub fn mean_speed(&self) -> Option<f64> {
        self.mean_speed
    }

    /// The number of vehicles counted since the start of the run.
    pub fn total_count(&self) -> u64 {
        self.total
    }

    fn update(&mut self, dt: f64, interval: f64, lanes: &[LaneSegment]) {
        let crossing = lanes
            .iter()
            .flat_map(|lane| lane.iter())
            .filter(|veh| veh.pos_old() < self.position && veh.pos_front() >= self.position);
        for veh in crossing {
            self.count += 1;
            self.total += 1;
            self.speed_sum += veh.speed();
        }

        self.elapsed += dt;
        if self.elapsed >= interval {
            self.flow = 3600.0 * self.count as f64 / self.elapsed;
            self.mean_speed = (self.count > 0).then(|| self.speed_sum / self.count as f64);
            self.count = 0;
            self.speed_sum = 0.0;
            self.elapsed = 0.0;
        }
    }
}

/// The loop detectors of a road segment.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopDetectors {
    detectors: Vec<LoopDetector>,
    interval: f64,
}

impl LoopDetectors {
    /// Creates detectors at the given positions, aggregating over `interval` s.
    pub fn new(positions: impl IntoIterator<Item = f64>, interval: f64) -> Self {
        Self {
            detectors: positions.into_iter().map(LoopDetector::new).collect(),
            interval,
        }
    }

    pub fn detectors(&self) -> &[LoopDetector] {
        &self.detectors
    }

    pub(crate) fn time_step(&mut self, dt: f64, lanes: &[LaneSegment]) {
        for detector in &mut self.detectors {
            detector.update(dt, self.interval, lanes);
        }
    }

    pub(crate) fn reset(&mut self) {
        for detector in &mut self.detectors {
            *detector = LoopDetector::new(detector.position);
        }
    }
}
