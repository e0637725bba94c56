//! Proficiency compatibility between source and target skill levels

use crate::processing::skill::{SkillLevel, MAX_LEVEL};

/// Compatibility by absolute level gap, 0 through 6
const GAP_COMPATIBILITY: [f32; MAX_LEVEL as usize] = [1.0, 0.8, 0.6, 0.4, 0.2, 0.1, 0.0];

/// Fixed 7x7 lookup `M[source - 1][target - 1]`.
///
/// Pure and stateless; one instance is built by the engine and shared by
/// the refiner, the scorer and the level-gap penalty.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelCompatibility {
    matrix: [[f32; MAX_LEVEL as usize]; MAX_LEVEL as usize],
}

impl LevelCompatibility {
    pub fn new() -> Self {
        let size = MAX_LEVEL as usize;
        let mut matrix = [[0.0; MAX_LEVEL as usize]; MAX_LEVEL as usize];
        for (i, row) in matrix.iter_mut().enumerate().take(size) {
            for (j, cell) in row.iter_mut().enumerate().take(size) {
                *cell = GAP_COMPATIBILITY[i.abs_diff(j)];
            }
        }
        Self { matrix }
    }

    pub fn get(&self, source: SkillLevel, target: SkillLevel) -> f32 {
        self.matrix[source.index()][target.index()]
    }

    /// Lookup for fractional mean levels, rounded to the nearest level
    pub fn for_means(&self, source_mean: f32, target_mean: f32) -> f32 {
        let source = SkillLevel::new(source_mean.round() as i64);
        let target = SkillLevel::new(target_mean.round() as i64);
        self.get(source, target)
    }

    pub fn rows(&self) -> &[[f32; MAX_LEVEL as usize]; MAX_LEVEL as usize] {
        &self.matrix
    }
}

impl Default for LevelCompatibility {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_is_symmetric() {
        let m = LevelCompatibility::new();
        for i in 1..=7 {
            for j in 1..=7 {
                assert_eq!(
                    m.get(SkillLevel::new(i), SkillLevel::new(j)),
                    m.get(SkillLevel::new(j), SkillLevel::new(i))
                );
            }
        }
    }

    #[test]
    fn test_known_cells() {
        let m = LevelCompatibility::new();
        let l = SkillLevel::new;
        assert_eq!(m.get(l(3), l(3)), 1.0);
        assert_eq!(m.get(l(1), l(7)), 0.0);
        assert_eq!(m.get(l(6), l(1)), 0.1);
        assert_eq!(m.get(l(4), l(7)), 0.4);
        assert_eq!(m.get(l(2), l(6)), 0.2);
    }

    #[test]
    fn test_only_corners_reach_zero() {
        let m = LevelCompatibility::new();
        let zeros: usize = m
            .rows()
            .iter()
            .map(|row| row.iter().filter(|v| **v == 0.0).count())
            .sum();
        assert_eq!(zeros, 2);
    }

    #[test]
    fn test_for_means_rounds() {
        let m = LevelCompatibility::new();
        assert_eq!(m.for_means(2.4, 2.6), m.get(SkillLevel::new(2), SkillLevel::new(3)));
    }
}
