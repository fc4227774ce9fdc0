//! The `PeriodicBox` type represents the enclosing box of a simulated system,
//! with fully periodic boundary conditions in two or three dimensions.

use crate::{Error, Vector3D};

/// A `PeriodicBox` defines the physical boundaries of one simulation frame.
///
/// The box is a parallelepiped described by three axis lengths and three tilt
/// factors, following the usual upper-triangular cell matrix convention: the
/// box vectors are `a = (Lx, 0, 0)`, `b = (xy·Ly, Ly, 0)` and
/// `c = (xz·Lz, yz·Lz, Lz)`. All tilt factors at zero give an orthorhombic
/// box.
///
/// In 2D mode the box lives in the xy plane: `Lz`, `xz` and `yz` are zero, the
/// z direction is not periodic, and all positions are expected to have
/// `z = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    /// box lengths along each axis
    lengths: Vector3D,
    /// xy tilt factor
    xy: f64,
    /// xz tilt factor
    xz: f64,
    /// yz tilt factor
    yz: f64,
    /// is this box 2-dimensional?
    is_2d: bool,
}

impl PeriodicBox {
    /// Create a triclinic 3D box with the given lengths and tilt factors
    pub fn triclinic(lx: f64, ly: f64, lz: f64, xy: f64, xz: f64, yz: f64) -> Result<PeriodicBox, Error> {
        check_length("Lx", lx)?;
        check_length("Ly", ly)?;
        check_length("Lz", lz)?;
        check_tilt("xy", xy)?;
        check_tilt("xz", xz)?;
        check_tilt("yz", yz)?;

        return Ok(PeriodicBox {
            lengths: Vector3D::new(lx, ly, lz),
            xy: xy,
            xz: xz,
            yz: yz,
            is_2d: false,
        });
    }

    /// Create an orthorhombic 3D box with the given side lengths
    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Result<PeriodicBox, Error> {
        PeriodicBox::triclinic(lx, ly, lz, 0.0, 0.0, 0.0)
    }

    /// Create a cubic 3D box with the given side length
    pub fn cubic(length: f64) -> Result<PeriodicBox, Error> {
        PeriodicBox::orthorhombic(length, length, length)
    }

    /// Create a tilted 2D box in the xy plane
    pub fn triclinic_2d(lx: f64, ly: f64, xy: f64) -> Result<PeriodicBox, Error> {
        check_length("Lx", lx)?;
        check_length("Ly", ly)?;
        check_tilt("xy", xy)?;

        return Ok(PeriodicBox {
            lengths: Vector3D::new(lx, ly, 0.0),
            xy: xy,
            xz: 0.0,
            yz: 0.0,
            is_2d: true,
        });
    }

    /// Create a rectangular 2D box in the xy plane
    pub fn rectangular(lx: f64, ly: f64) -> Result<PeriodicBox, Error> {
        PeriodicBox::triclinic_2d(lx, ly, 0.0)
    }

    /// Get the box lengths along each axis. In 2D mode the z length is zero.
    pub fn lengths(&self) -> Vector3D {
        self.lengths
    }

    /// Get the xy, xz and yz tilt factors
    pub fn tilts(&self) -> (f64, f64, f64) {
        (self.xy, self.xz, self.yz)
    }

    /// Check if this box is 2-dimensional
    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    /// Get the fractional coordinates of `vector` in this box
    pub fn fractional(&self, vector: Vector3D) -> Vector3D {
        let l = self.lengths;
        if self.is_2d {
            let fy = vector.y / l.y;
            let fx = (vector.x - self.xy * l.y * fy) / l.x;
            return Vector3D::new(fx, fy, 0.0);
        }

        let fz = vector.z / l.z;
        let fy = (vector.y - self.yz * l.z * fz) / l.y;
        let fx = (vector.x - self.xy * l.y * fy - self.xz * l.z * fz) / l.x;
        return Vector3D::new(fx, fy, fz);
    }

    /// Get the Cartesian representation of the `fractional` coordinates in
    /// this box
    pub fn cartesian(&self, fractional: Vector3D) -> Vector3D {
        let l = self.lengths;
        let x = l.x * fractional.x + self.xy * l.y * fractional.y + self.xz * l.z * fractional.z;
        let y = l.y * fractional.y + self.yz * l.z * fractional.z;
        let z = l.z * fractional.z;
        return Vector3D::new(x, y, z);
    }

    /// Wrap an absolute position inside the box, producing fractional
    /// coordinates in `[0, 1)` along each periodic axis.
    pub fn wrap(&self, vector: Vector3D) -> Vector3D {
        let mut fractional = self.fractional(vector);
        fractional.x -= f64::floor(fractional.x);
        fractional.y -= f64::floor(fractional.y);
        if !self.is_2d {
            fractional.z -= f64::floor(fractional.z);
        }
        return self.cartesian(fractional);
    }

    /// Get the minimum image of a displacement `vector`: the shortest
    /// equivalent displacement considering all periodic translations.
    ///
    /// In 2D mode the z component is passed through unchanged.
    pub fn min_image(&self, vector: Vector3D) -> Vector3D {
        let mut fractional = self.fractional(vector);
        fractional.x -= f64::round(fractional.x);
        fractional.y -= f64::round(fractional.y);
        if self.is_2d {
            let mut image = self.cartesian(fractional);
            image.z = vector.z;
            return image;
        }
        fractional.z -= f64::round(fractional.z);
        return self.cartesian(fractional);
    }

    /// Squared minimum image distance between the points `u` and `v`
    pub fn distance2(&self, u: Vector3D, v: Vector3D) -> f64 {
        self.min_image(v - u).norm2()
    }

    /// Minimum image distance between the points `u` and `v`
    pub fn distance(&self, u: Vector3D, v: Vector3D) -> f64 {
        f64::sqrt(self.distance2(u, v))
    }

    /// Get the distance between opposite faces of the box along each axis.
    ///
    /// For a tilted box this is smaller than the corresponding box length; it
    /// bounds both the grid cell sizes and the largest cutoff for which the
    /// minimum image convention stays valid. In 2D mode the z component is
    /// zero.
    pub fn nearest_plane_distances(&self) -> Vector3D {
        let l = self.lengths;
        if self.is_2d {
            let dx = l.x / f64::sqrt(1.0 + self.xy * self.xy);
            return Vector3D::new(dx, l.y, 0.0);
        }

        let xy_yz_xz = self.xy * self.yz - self.xz;
        let dx = l.x / f64::sqrt(1.0 + self.xy * self.xy + xy_yz_xz * xy_yz_xz);
        let dy = l.y / f64::sqrt(1.0 + self.yz * self.yz);
        return Vector3D::new(dx, dy, l.z);
    }
}

fn check_length(name: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "box length {} must be positive and finite, got {}", name, value
        )));
    }
    return Ok(());
}

fn check_tilt(name: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "box tilt factor {} must be finite, got {}", name, value
        )));
    }
    return Ok(());
}
