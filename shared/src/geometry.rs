/// Integer world coordinates of a session.
/// `x` and `z` span the signed 16-bit range, `y` spans 0..=254.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const MIN_XZ: i32 = i16::MIN as i32;
    pub const MAX_XZ: i32 = i16::MAX as i32;
    pub const MIN_Y: i32 = 0;
    pub const MAX_Y: i32 = 254;

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Whether all three coordinates lie inside the world bounds.
    pub fn in_bounds(&self) -> bool {
        (Self::MIN_XZ..=Self::MAX_XZ).contains(&self.x)
            && (Self::MIN_Y..=Self::MAX_Y).contains(&self.y)
            && (Self::MIN_XZ..=Self::MAX_XZ).contains(&self.z)
    }
}

/// Euclidean distance between two positions.
///
/// Differences are widened to i64 before squaring: two opposite corners of
/// the world differ by 65535 on an axis and the sum of squares overflows i32.
pub fn distance(a: Position, b: Position) -> f64 {
    let dx = (a.x - b.x) as i64;
    let dy = (a.y - b.y) as i64;
    let dz = (a.z - b.z) as i64;
    ((dx * dx + dy * dy + dz * dz) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_positions_have_zero_distance() {
        let p = Position::new(120, 64, -3000);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Position::new(-500, 12, 730);
        let b = Position::new(32000, 254, -32768);
        assert_eq!(distance(a, b), distance(b, a));
    }

    #[test]
    fn pythagorean_triple() {
        let a = Position::new(0, 0, 0);
        let b = Position::new(3, 4, 0);
        assert!((distance(a, b) - 5.0).abs() < 1e-12);

        let c = Position::new(2, 3, 6);
        assert!((distance(a, c) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn opposite_corners_do_not_overflow() {
        let a = Position::new(Position::MIN_XZ, Position::MIN_Y, Position::MIN_XZ);
        let b = Position::new(Position::MAX_XZ, Position::MAX_Y, Position::MAX_XZ);
        let expected = (2.0 * 65535.0f64 * 65535.0 + 254.0 * 254.0).sqrt();
        assert!((distance(a, b) - expected).abs() < 1e-6);
    }

    #[test]
    fn bounds_check() {
        assert!(Position::new(0, 0, 0).in_bounds());
        assert!(Position::new(-32768, 254, 32767).in_bounds());
        assert!(!Position::new(0, 255, 0).in_bounds());
        assert!(!Position::new(40000, 10, 0).in_bounds());
        assert!(!Position::new(0, -1, 0).in_bounds());
    }
}
