//! Broad-phase collision detection.
//!
//! The broad phase consumes the set of active collision models (as
//! precomputed bounding boxes) and outputs candidate pairs. Its one hard
//! contract: no false negatives. A real overlap must appear as a candidate
//! pair; false positives are acceptable and filtered by the narrow phase.
//!
//! Two algorithms are provided behind the [`BroadPhase`] trait: an O(n²)
//! brute force for small scenes and a single-axis sweep-and-prune for
//! larger ones, with [`BroadPhaseDetector`] auto-selecting by model count.

use scene_types::{Aabb, ModelId};

/// One model's broad-phase input.
#[derive(Debug, Clone)]
pub struct BroadPhaseEntry {
    /// The model this entry describes.
    pub model: ModelId,
    /// Precomputed world-space bounds (margin already applied).
    pub aabb: Aabb,
    /// Whether the model is static scene geometry.
    pub is_static: bool,
}

/// Trait for broad-phase algorithms.
pub trait BroadPhase {
    /// Find all pairs of models whose bounds overlap.
    ///
    /// Static-static pairs are skipped; they cannot produce a response.
    fn find_pairs(&mut self, entries: &[BroadPhaseEntry]) -> Vec<(ModelId, ModelId)>;
}

/// O(n²) all-pairs broad phase for small scenes.
#[derive(Debug, Clone, Default)]
pub struct BruteForce;

impl BroadPhase for BruteForce {
    fn find_pairs(&mut self, entries: &[BroadPhaseEntry]) -> Vec<(ModelId, ModelId)> {
        let mut pairs = Vec::new();
        for (i, a) in entries.iter().enumerate() {
            for b in entries.iter().skip(i + 1) {
                if a.is_static && b.is_static {
                    continue;
                }
                if a.aabb.overlaps(&b.aabb) {
                    pairs.push((a.model, b.model));
                }
            }
        }
        pairs
    }
}

/// Single-axis sweep-and-prune broad phase.
///
/// Projects bounds onto the axis with the largest scene extent, sorts by
/// minimum endpoint, and sweeps; candidates found on the sweep axis are
/// confirmed on all three axes before being reported.
#[derive(Debug, Clone, Default)]
pub struct SweepAndPrune {
    intervals: Vec<Interval>,
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    entry_index: usize,
    min: f64,
    max: f64,
}

impl SweepAndPrune {
    /// Create a sweep-and-prune broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Axis with the largest spread of bounds, which tends to minimize
    /// interval overlap.
    fn choose_sweep_axis(entries: &[BroadPhaseEntry]) -> usize {
        let mut best_axis = 0;
        let mut best_extent = f64::NEG_INFINITY;
        for axis in 0..3 {
            let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
            for entry in entries {
                // Static slabs would dominate the extent; ignore them when
                // choosing the axis.
                if entry.is_static {
                    continue;
                }
                lo = lo.min(entry.aabb.min_on_axis(axis));
                hi = hi.max(entry.aabb.max_on_axis(axis));
            }
            let extent = hi - lo;
            if extent > best_extent {
                best_extent = extent;
                best_axis = axis;
            }
        }
        best_axis
    }
}

impl BroadPhase for SweepAndPrune {
    fn find_pairs(&mut self, entries: &[BroadPhaseEntry]) -> Vec<(ModelId, ModelId)> {
        let axis = Self::choose_sweep_axis(entries);

        self.intervals.clear();
        for (entry_index, entry) in entries.iter().enumerate() {
            self.intervals.push(Interval {
                entry_index,
                min: entry.aabb.min_on_axis(axis),
                max: entry.aabb.max_on_axis(axis),
            });
        }
        self.intervals.sort_by(|a, b| {
            a.min
                .partial_cmp(&b.min)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut pairs = Vec::new();
        for i in 0..self.intervals.len() {
            let interval_i = self.intervals[i];
            for j in (i + 1)..self.intervals.len() {
                let interval_j = self.intervals[j];
                if interval_j.min > interval_i.max {
                    break;
                }
                let a = &entries[interval_i.entry_index];
                let b = &entries[interval_j.entry_index];
                if a.is_static && b.is_static {
                    continue;
                }
                if a.aabb.overlaps(&b.aabb) {
                    pairs.push((a.model, b.model));
                }
            }
        }
        pairs
    }
}

/// Broad-phase algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadPhaseAlgorithm {
    /// Choose by model count.
    #[default]
    Auto,
    /// Always brute force.
    BruteForce,
    /// Always sweep-and-prune.
    SweepAndPrune,
}

/// Configuration for the broad phase.
#[derive(Debug, Clone)]
pub struct BroadPhaseConfig {
    /// Algorithm selection.
    pub algorithm: BroadPhaseAlgorithm,
    /// Margin added to every AABB for predictive detection.
    pub margin: f64,
    /// Model count below which brute force is used in `Auto` mode.
    pub brute_force_threshold: usize,
}

impl Default for BroadPhaseConfig {
    fn default() -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::Auto,
            margin: 0.0,
            brute_force_threshold: 32,
        }
    }
}

/// Algorithm selection wrapper with a stable interface for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct BroadPhaseDetector {
    config: BroadPhaseConfig,
    sap: SweepAndPrune,
    brute: BruteForce,
}

impl BroadPhaseDetector {
    /// Create a detector with the given configuration.
    #[must_use]
    pub fn new(config: BroadPhaseConfig) -> Self {
        Self {
            config,
            sap: SweepAndPrune::new(),
            brute: BruteForce,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &BroadPhaseConfig {
        &self.config
    }

    /// Find candidate pairs with the configured algorithm.
    pub fn find_pairs(&mut self, entries: &[BroadPhaseEntry]) -> Vec<(ModelId, ModelId)> {
        match self.config.algorithm {
            BroadPhaseAlgorithm::Auto => {
                if entries.len() < self.config.brute_force_threshold {
                    self.brute.find_pairs(entries)
                } else {
                    self.sap.find_pairs(entries)
                }
            }
            BroadPhaseAlgorithm::BruteForce => self.brute.find_pairs(entries),
            BroadPhaseAlgorithm::SweepAndPrune => self.sap.find_pairs(entries),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::collections::HashSet;

    fn entry(id: u64, center: [f64; 3], half: f64) -> BroadPhaseEntry {
        BroadPhaseEntry {
            model: ModelId::new(id as u32),
            aabb: Aabb::from_center(
                Vector3::new(center[0], center[1], center[2]),
                Vector3::repeat(half),
            ),
            is_static: false,
        }
    }

    fn static_entry(id: u64) -> BroadPhaseEntry {
        BroadPhaseEntry {
            model: ModelId::new(id as u32),
            aabb: Aabb::new(Vector3::repeat(-1e6), Vector3::new(1e6, 1e6, 0.0)),
            is_static: true,
        }
    }

    fn normalize(pairs: &[(ModelId, ModelId)]) -> HashSet<(u32, u32)> {
        pairs
            .iter()
            .map(|&(a, b)| {
                if a.raw() < b.raw() {
                    (a.raw(), b.raw())
                } else {
                    (b.raw(), a.raw())
                }
            })
            .collect()
    }

    #[test]
    fn test_brute_force_finds_overlap() {
        let entries = vec![
            entry(0, [0.0, 0.0, 0.0], 1.0),
            entry(1, [1.5, 0.0, 0.0], 1.0),
            entry(2, [10.0, 0.0, 0.0], 1.0),
        ];
        let pairs = BruteForce.find_pairs(&entries);
        assert_eq!(normalize(&pairs), HashSet::from([(0, 1)]));
    }

    #[test]
    fn test_sap_matches_brute_force() {
        // A line of partially overlapping boxes plus outliers.
        let mut entries: Vec<_> = (0..20)
            .map(|i| entry(i, [i as f64 * 1.5, 0.0, 0.0], 1.0))
            .collect();
        entries.push(entry(100, [0.0, 50.0, 0.0], 1.0));

        let brute_pairs = BruteForce.find_pairs(&entries);
        let sap_pairs = SweepAndPrune::new().find_pairs(&entries);

        assert_eq!(normalize(&brute_pairs), normalize(&sap_pairs));
        assert!(!brute_pairs.is_empty());
    }

    #[test]
    fn test_static_static_pairs_skipped() {
        let entries = vec![static_entry(0), static_entry(1)];
        assert!(BruteForce.find_pairs(&entries).is_empty());
        assert!(SweepAndPrune::new().find_pairs(&entries).is_empty());
    }

    #[test]
    fn test_static_dynamic_pairs_kept() {
        let entries = vec![static_entry(0), entry(1, [0.0, 0.0, -0.5], 1.0)];
        let pairs = BruteForce.find_pairs(&entries);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_no_false_negatives_against_sweep_axis_choice() {
        // Overlap only matters on the axis SAP does NOT sweep: the spread
        // is on x, the overlap on y/z.
        let entries = vec![
            entry(0, [0.0, 0.0, 0.0], 1.0),
            entry(1, [0.5, 0.5, 0.0], 1.0),
            entry(2, [30.0, 0.0, 0.0], 1.0),
        ];
        let pairs = SweepAndPrune::new().find_pairs(&entries);
        assert_eq!(normalize(&pairs), HashSet::from([(0, 1)]));
    }

    #[test]
    fn test_detector_auto_selection() {
        let mut detector = BroadPhaseDetector::default();
        let small: Vec<_> = (0..4).map(|i| entry(i, [i as f64 * 5.0, 0.0, 0.0], 1.0)).collect();
        assert!(detector.find_pairs(&small).is_empty());

        let large: Vec<_> = (0..64)
            .map(|i| entry(i, [i as f64 * 5.0, 0.0, 0.0], 1.0))
            .collect();
        assert!(detector.find_pairs(&large).is_empty());
    }
}
