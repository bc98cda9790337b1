//! Cross-section properties of a trunk section
//!
//! The section is a triangle core with three semicircular chambers on its sides. Calculations
//! are done in millimeters and returned in meters.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::PI;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Thickness of the chamber wall.
///
/// Units: millimeters
const WALL_THICKNESS_MM: f64 = 2.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Geometric properties of a section's cross-section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSection {
    /// Distance from the centre of the section to the centroid of a chamber.
    ///
    /// Units: meters
    pub chamber_centroid_dist: f64,

    /// Area of silicone.
    ///
    /// Units: meters^2
    pub silicone_area: f64,

    /// Area of one chamber.
    ///
    /// Units: meters^2
    pub chamber_area: f64,

    /// Second moment of area about a bending axis.
    ///
    /// Units: meters^4
    pub second_moment_of_area: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CrossSection {
    /// Compute the properties of a section with the given outer radius.
    ///
    /// Units: meters
    pub fn from_radius(radius_m: f64) -> Self {
        let radius = radius_m * 1000.0;

        // Cavity radius, outer shell radius and the side of the core triangle
        let r1 = radius - WALL_THICKNESS_MM;
        let r2 = radius;
        let l1 = 2.0 * radius;

        // Chamber centroid to the section baseline, and chamber centroid to section centroid
        let k1 = 4.0 * (r2.powi(3) - r1.powi(3)) / (3.0 * PI * (r2.powi(2) - r1.powi(2)));
        let k2 = k1 + l1 / 2.0 / 3f64.sqrt();

        let i_triangle = 3f64.sqrt() * l1.powi(4) / 96.0;

        let i_rect_y = 4.0 * r1.powi(3) / 3.0;
        let i_rect_x = r1 + 4.0 * r1 * (1.0 + k2 - k1).powi(2);

        let ring = r2.powi(2) - r1.powi(2);
        let i_chamber_y = PI * (r2.powi(4) - r1.powi(4)) / 8.0;
        let i_chamber_x =
            i_chamber_y - k1.powi(2) * ring * PI / 2.0 + k2.powi(2) * ring * PI / 2.0;

        let chamber_area = r1.powi(2) * PI / 2.0 - 4.0 * r1;
        let chamber_centroid_dist =
            l1 / 2.0 / 3f64.sqrt() + (4.0 * r1.powi(2) - 24.0) / (3.0 * r1 * PI - 24.0);
        let silicone_area =
            3.0 * (r2.powi(2) * PI / 2.0 - chamber_area) + 3f64.sqrt() / 4.0 * l1.powi(2);

        // The chambers and rectangles at 2pi/3 and 4pi/3 contribute their rotated moments
        let second_moment_of_area = i_triangle
            + i_rect_y
            + (i_rect_y / 2.0 + i_rect_x * 1.5)
            + i_chamber_y
            + (i_chamber_y / 2.0 + i_chamber_x * 1.5);

        Self {
            chamber_centroid_dist: chamber_centroid_dist / 1e3,
            silicone_area: silicone_area / 1e6,
            chamber_area: chamber_area / 1e6,
            second_moment_of_area: second_moment_of_area / 1e12,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_properties_are_physical() {
        let small = CrossSection::from_radius(0.0099);
        let large = CrossSection::from_radius(0.0175);

        for cs in [small, large].iter() {
            assert!(cs.chamber_area > 0.0);
            assert!(cs.silicone_area > 0.0);
            assert!(cs.second_moment_of_area > 0.0);
            assert!(cs.chamber_centroid_dist > 0.0);
            assert!(cs.chamber_centroid_dist < 0.035);
        }

        assert!(large.second_moment_of_area > small.second_moment_of_area);
        assert!(large.chamber_area > small.chamber_area);
    }
}
