use nalgebra::{Matrix3, Point3, Vector3};

const DEGENERACY_EPSILON: f64 = 1e-12;

/// Periodic simulation domain spanned by three cell vectors.
///
/// The columns of `matrix` are the cell vectors `a`, `b` and `c`; a point with
/// reduced coordinates `r` sits at `origin + matrix * r`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationCell {
    matrix: Matrix3<f64>,
    origin: Point3<f64>,
    pbc: [bool; 3],
    is_2d: bool,
}

impl Default for SimulationCell {
    fn default() -> Self {
        Self {
            matrix: Matrix3::zeros(),
            origin: Point3::origin(),
            pbc: [false; 3],
            is_2d: false,
        }
    }
}

impl SimulationCell {
    pub fn new(matrix: Matrix3<f64>, origin: Point3<f64>, pbc: [bool; 3]) -> Self {
        Self {
            matrix,
            origin,
            pbc,
            is_2d: false,
        }
    }

    pub fn from_vectors(
        a: Vector3<f64>,
        b: Vector3<f64>,
        c: Vector3<f64>,
        origin: Point3<f64>,
        pbc: [bool; 3],
    ) -> Self {
        Self::new(Matrix3::from_columns(&[a, b, c]), origin, pbc)
    }

    /// Axis-aligned box spanning `lo..hi` on each axis.
    pub fn from_bounds(lo: [f64; 3], hi: [f64; 3], pbc: [bool; 3]) -> Self {
        let matrix = Matrix3::from_diagonal(&Vector3::new(hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]));
        Self::new(matrix, Point3::new(lo[0], lo[1], lo[2]), pbc)
    }

    /// Smallest axis-aligned, non-periodic box enclosing all points.
    pub fn bounding_box(points: &[Point3<f64>]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let mut lo = first.coords;
        let mut hi = first.coords;
        for p in &points[1..] {
            lo = lo.inf(&p.coords);
            hi = hi.sup(&p.coords);
        }
        Self::from_bounds(lo.into(), hi.into(), [false; 3])
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    pub fn cell_vector(&self, axis: usize) -> Vector3<f64> {
        self.matrix.column(axis).into_owned()
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn set_pbc(&mut self, pbc: [bool; 3]) {
        self.pbc = pbc;
    }

    pub fn has_pbc(&self) -> bool {
        self.pbc.iter().any(|&p| p)
    }

    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    pub fn set_2d(&mut self, is_2d: bool) {
        self.is_2d = is_2d;
    }

    /// Volume of the cell, or the area of the `a`/`b` face for 2D cells.
    pub fn volume(&self) -> f64 {
        if self.is_2d {
            self.cell_vector(0).cross(&self.cell_vector(1)).norm()
        } else {
            self.matrix.determinant().abs()
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.volume() <= DEGENERACY_EPSILON
    }

    pub fn inverse_matrix(&self) -> Option<Matrix3<f64>> {
        self.matrix.try_inverse()
    }

    pub fn reduced_to_absolute(&self, reduced: &Point3<f64>) -> Point3<f64> {
        self.origin + self.matrix * reduced.coords
    }

    pub fn absolute_to_reduced(&self, point: &Point3<f64>) -> Option<Point3<f64>> {
        let inverse = self.inverse_matrix()?;
        Some(Point3::from(inverse * (point - self.origin)))
    }

    /// Distance between the two cell faces perpendicular to each axis.
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        let volume = self.matrix.determinant().abs();
        let (a, b, c) = (self.cell_vector(0), self.cell_vector(1), self.cell_vector(2));
        let face = |u: Vector3<f64>, v: Vector3<f64>| u.cross(&v).norm();
        let width = |area: f64| if area > 0.0 { volume / area } else { 0.0 };
        [width(face(b, c)), width(face(c, a)), width(face(a, b))]
    }

    /// Low and high corners of the cell's axis-aligned bounds.
    ///
    /// For an orthogonal cell these are exactly the box bounds it was built from.
    pub fn box_bounds(&self) -> ([f64; 3], [f64; 3]) {
        let mut lo = self.origin.coords;
        let mut hi = self.origin.coords;
        for corner in 1..8u8 {
            let mut p = self.origin.coords;
            for axis in 0..3 {
                if corner & (1 << axis) != 0 {
                    p += self.cell_vector(axis);
                }
            }
            lo = lo.inf(&p);
            hi = hi.sup(&p);
        }
        (lo.into(), hi.into())
    }

    /// Shortest periodic image of a displacement in reduced coordinates.
    ///
    /// Returns the wrapped reduced delta and the image shift that was applied.
    pub fn wrap_reduced_delta(&self, mut delta: Vector3<f64>) -> (Vector3<f64>, Vector3<i32>) {
        let mut shift = Vector3::zeros();
        for axis in 0..3 {
            if self.pbc[axis] {
                let s = delta[axis].round();
                delta[axis] -= s;
                shift[axis] = -(s as i32);
            }
        }
        (delta, shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn from_bounds_round_trips_through_box_bounds() {
        let cell = SimulationCell::from_bounds([-1.5, 0.0, 2.0], [3.5, 10.0, 2.25], [true; 3]);
        let (lo, hi) = cell.box_bounds();
        for axis in 0..3 {
            assert!((lo[axis] - [-1.5, 0.0, 2.0][axis]).abs() < TOLERANCE);
            assert!((hi[axis] - [3.5, 10.0, 2.25][axis]).abs() < TOLERANCE);
        }
    }

    #[test]
    fn volume_of_box_is_product_of_edges() {
        let cell = SimulationCell::from_bounds([0.0; 3], [10.0; 3], [false; 3]);
        assert!((cell.volume() - 1000.0).abs() < TOLERANCE);
        assert!(!cell.is_degenerate());
    }

    #[test]
    fn two_dimensional_volume_uses_face_area() {
        let mut cell = SimulationCell::from_bounds([0.0; 3], [2.0, 3.0, 0.0], [true, true, false]);
        assert!(cell.is_degenerate());
        cell.set_2d(true);
        assert!((cell.volume() - 6.0).abs() < TOLERANCE);
    }

    #[test]
    fn reduced_and_absolute_coordinates_are_inverse() {
        let cell = SimulationCell::from_vectors(
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(1.0, 5.0, 0.0),
            Vector3::new(0.5, -1.0, 6.0),
            Point3::new(1.0, 2.0, 3.0),
            [true; 3],
        );
        let p = Point3::new(2.5, 3.0, 4.0);
        let r = cell.absolute_to_reduced(&p).unwrap();
        let back = cell.reduced_to_absolute(&r);
        assert!((back - p).norm() < 1e-10);
    }

    #[test]
    fn perpendicular_widths_account_for_tilt() {
        let cell = SimulationCell::from_vectors(
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(2.0, 3.0, 0.0),
            Vector3::new(0.0, 0.0, 5.0),
            Point3::origin(),
            [true; 3],
        );
        let widths = cell.perpendicular_widths();
        assert!((widths[0] - 4.0 * 3.0 / 13f64.sqrt()).abs() < 1e-10);
        assert!((widths[1] - 3.0).abs() < 1e-10);
        assert!((widths[2] - 5.0).abs() < 1e-10);
    }

    #[test]
    fn wrap_reduced_delta_only_touches_periodic_axes() {
        let cell = SimulationCell::from_bounds([0.0; 3], [1.0; 3], [true, false, true]);
        let (delta, shift) = cell.wrap_reduced_delta(Vector3::new(0.8, 0.8, -0.7));
        assert!((delta - Vector3::new(-0.2, 0.8, 0.3)).norm() < TOLERANCE);
        assert_eq!(shift, Vector3::new(-1, 0, 1));
    }

    #[test]
    fn bounding_box_encloses_points_without_periodicity() {
        let cell = SimulationCell::bounding_box(&[
            Point3::new(1.0, -2.0, 0.5),
            Point3::new(-1.0, 4.0, 0.0),
        ]);
        assert_eq!(cell.pbc(), [false; 3]);
        assert_eq!(cell.box_bounds(), ([-1.0, -2.0, 0.0], [1.0, 4.0, 0.5]));
    }
}
