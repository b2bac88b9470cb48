use glam::Vec3;
use rand::Rng;
use tracing::warn;
use wavefront_core::{ConfigError, LocationSelector};

/// How dynamic locations are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpawnMode {
    /// Pick among the configured spawn points.
    #[default]
    Points,
    /// Pick a random position inside the spawn area.
    Area,
}

/// Axis-aligned box used for area spawns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnArea {
    /// Center of the box in world space.
    pub center: Vec3,
    /// Full extent of the box along each axis.
    pub size: Vec3,
}

impl Default for SpawnArea {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            size: Vec3::new(10.0, 0.0, 10.0),
        }
    }
}

/// Where actors may appear.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnLayout {
    /// Policy for dynamic locations.
    pub mode: SpawnMode,
    /// Spawn points addressed by [`LocationSelector::Index`].
    pub points: Vec<Vec3>,
    /// Area sampled in [`SpawnMode::Area`] or when no points exist.
    pub area: SpawnArea,
    /// Pick a random point for dynamic spawns instead of the first one.
    pub randomize_point: bool,
}

impl Default for SpawnLayout {
    fn default() -> Self {
        Self {
            mode: SpawnMode::default(),
            points: Vec::new(),
            area: SpawnArea::default(),
            randomize_point: true,
        }
    }
}

impl SpawnLayout {
    /// Resolves a selector to a ground location.
    ///
    /// Explicit indices are only honoured in [`SpawnMode::Points`]; an index
    /// outside the configured points falls back to dynamic resolution.
    pub fn resolve<R: Rng + ?Sized>(&self, selector: LocationSelector, rng: &mut R) -> Vec3 {
        if let (SpawnMode::Points, LocationSelector::Index(index)) = (self.mode, selector) {
            let point = usize::try_from(index)
                .ok()
                .and_then(|index| self.points.get(index));
            if let Some(point) = point {
                return *point;
            }
            warn!(
                index,
                points = self.points.len(),
                "spawn point index out of range; resolving dynamically"
            );
        }

        self.resolve_dynamic(rng)
    }

    /// Picks a location without an explicit spawn point.
    pub fn resolve_dynamic<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        if self.mode == SpawnMode::Points && !self.points.is_empty() {
            let index = if self.randomize_point {
                rng.gen_range(0..self.points.len())
            } else {
                0
            };
            return self.points[index];
        }

        let half = self.area.size * 0.5;
        self.area.center
            + Vec3::new(
                sample_axis(rng, half.x),
                sample_axis(rng, half.y),
                sample_axis(rng, half.z),
            )
    }

    /// Rejects negative area sizes and non-finite coordinates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.area.size.cmplt(Vec3::ZERO).any() {
            return Err(ConfigError::NegativeArea);
        }
        ensure_finite("area.center", self.area.center)?;
        ensure_finite("area.size", self.area.size)?;
        for point in &self.points {
            ensure_finite("points", *point)?;
        }
        Ok(())
    }
}

fn ensure_finite(field: &'static str, vector: Vec3) -> Result<(), ConfigError> {
    match vector.to_array().into_iter().find(|value| !value.is_finite()) {
        Some(value) => Err(ConfigError::NonFinite { field, value }),
        None => Ok(()),
    }
}

fn sample_axis<R: Rng + ?Sized>(rng: &mut R, half_extent: f32) -> f32 {
    if half_extent > 0.0 {
        rng.gen_range(-half_extent..half_extent)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn points() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 5.0),
        ]
    }

    #[test]
    fn explicit_index_selects_point() {
        let layout = SpawnLayout {
            points: points(),
            ..SpawnLayout::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            layout.resolve(LocationSelector::Index(1), &mut rng),
            Vec3::new(5.0, 0.0, 0.0)
        );
    }

    #[test]
    fn out_of_range_index_falls_back_to_a_configured_point() {
        let layout = SpawnLayout {
            points: points(),
            ..SpawnLayout::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..32 {
            let location = layout.resolve(LocationSelector::Index(42), &mut rng);
            assert!(layout.points.contains(&location), "{location:?}");
        }
    }

    #[test]
    fn fixed_point_selection_uses_first_point() {
        let layout = SpawnLayout {
            points: points(),
            randomize_point: false,
            ..SpawnLayout::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(
            layout.resolve(LocationSelector::Dynamic, &mut rng),
            Vec3::ZERO
        );
    }

    #[test]
    fn area_mode_ignores_indices_and_stays_inside_box() {
        let layout = SpawnLayout {
            mode: SpawnMode::Area,
            points: points(),
            area: SpawnArea {
                center: Vec3::new(100.0, 1.0, -50.0),
                size: Vec3::new(10.0, 0.0, 4.0),
            },
            randomize_point: true,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..64 {
            let location = layout.resolve(LocationSelector::Index(0), &mut rng);
            assert!((95.0..=105.0).contains(&location.x), "{location:?}");
            assert!((location.y - 1.0).abs() < f32::EPSILON);
            assert!((-52.0..=-48.0).contains(&location.z), "{location:?}");
        }
    }

    #[test]
    fn empty_points_fall_back_to_area() {
        let layout = SpawnLayout::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let location = layout.resolve(LocationSelector::Dynamic, &mut rng);
        assert!(location.x.abs() <= 5.0 && location.z.abs() <= 5.0);
        assert_eq!(location.y, 0.0);
    }

    #[test]
    fn negative_area_is_rejected() {
        let layout = SpawnLayout {
            area: SpawnArea {
                center: Vec3::ZERO,
                size: Vec3::new(-1.0, 0.0, 1.0),
            },
            ..SpawnLayout::default()
        };
        assert_eq!(layout.validate(), Err(ConfigError::NegativeArea));
    }
}
