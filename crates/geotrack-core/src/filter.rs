//! Minimum-displacement filtering of incoming fixes.

use geotrack_types::RawFix;

/// Drops fixes that are too close to the last accepted one.
///
/// The first fix is always accepted. A threshold of zero accepts everything.
#[derive(Debug, Clone)]
pub struct DisplacementFilter {
    min_displacement_m: f64,
    last: Option<RawFix>,
}

impl DisplacementFilter {
    /// Create a filter with the given threshold in meters.
    pub fn new(min_displacement_m: f64) -> Self {
        Self {
            min_displacement_m: min_displacement_m.max(0.0),
            last: None,
        }
    }

    /// Decide whether `fix` should be kept, remembering it if so.
    pub fn accept(&mut self, fix: &RawFix) -> bool {
        let keep = match &self.last {
            None => true,
            Some(_) if self.min_displacement_m == 0.0 => true,
            Some(last) => last.distance_to(fix) >= self.min_displacement_m,
        };
        if keep {
            self.last = Some(fix.clone());
        }
        keep
    }

    /// Forget the last accepted fix.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn threshold(&self) -> f64 {
        self.min_displacement_m
    }
}
