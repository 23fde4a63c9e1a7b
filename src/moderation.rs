/// Scores strictly above this are rejected.
///
/// Far below the ~0.5 split most classifiers use; kept as-is pending review,
/// override with `TOXICITY_THRESHOLD`.
pub const DEFAULT_TOXICITY_THRESHOLD: f64 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

#[derive(Clone, Copy, Debug)]
pub struct ModerationGate {
    threshold: f64,
}

impl Default for ModerationGate {
    fn default() -> Self {
        Self::new(DEFAULT_TOXICITY_THRESHOLD)
    }
}

impl ModerationGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decide(&self, score: f64) -> Decision {
        if score > self.threshold {
            Decision::Reject
        } else {
            Decision::Accept
        }
    }
}
