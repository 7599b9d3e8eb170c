use rand::Rng;

use crate::api::job::models::Operation;

/// Placement URL the service accepts
pub const VALID_PLACEMENT_URL: &str = "http://mars.google.com/";

/// Placement URL the service rejects, used to exercise error reporting
pub const INVALID_PLACEMENT_URL: &str = "invalid-url";

/// Picks a valid or deliberately invalid placement URL per operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementGenerator {
    invalid_ratio: f64,
}

impl PlacementGenerator {
    /// `invalid_ratio` is clamped to [0, 1]
    pub fn new(invalid_ratio: f64) -> Self {
        let invalid_ratio = if invalid_ratio.is_nan() {
            0.0
        } else {
            invalid_ratio.clamp(0.0, 1.0)
        };
        Self { invalid_ratio }
    }

    pub fn url<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        if rng.gen_bool(self.invalid_ratio) {
            INVALID_PLACEMENT_URL
        } else {
            VALID_PLACEMENT_URL
        }
    }

    /// Build `count` ADD operations against `ad_group_id`
    pub fn build_operations<R: Rng + ?Sized>(
        &self,
        ad_group_id: i64,
        count: usize,
        rng: &mut R,
    ) -> Vec<Operation> {
        (0..count)
            .map(|_| Operation::add_placement(ad_group_id, self.url(&mut *rng)))
            .collect()
    }
}

impl Default for PlacementGenerator {
    /// One in ten placements is invalid
    fn default() -> Self {
        Self::new(0.1)
    }
}
