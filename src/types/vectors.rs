use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};

use approx::{AbsDiffEq, RelativeEq, UlpsEq};

/// A 3-dimensional vector type, implementing all usual arithmetic operations.
///
/// The product of two vectors (`u * v`) is their scalar (dot) product. Vector
/// components can be accessed either through the named fields (`v.x`) or by
/// indexing (`v[0]`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3D {
    /// First component of the vector
    pub x: f64,
    /// Second component of the vector
    pub y: f64,
    /// Third component of the vector
    pub z: f64,
}

impl Vector3D {
    /// Create a new `Vector3D` with components `x`, `y`, `z`
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Vector3D {
        Vector3D { x, y, z }
    }

    /// Create a new null `Vector3D`
    #[inline]
    pub fn zero() -> Vector3D {
        Vector3D::new(0.0, 0.0, 0.0)
    }

    /// Get the squared euclidean norm of this vector
    #[inline]
    pub fn norm2(&self) -> f64 {
        self * self
    }

    /// Get the euclidean norm of this vector
    #[inline]
    pub fn norm(&self) -> f64 {
        f64::sqrt(self.norm2())
    }

    /// Get a normalized copy of this vector
    #[inline]
    pub fn normalized(&self) -> Vector3D {
        self / self.norm()
    }
}

impl From<[f64; 3]> for Vector3D {
    fn from(values: [f64; 3]) -> Vector3D {
        Vector3D::new(values[0], values[1], values[2])
    }
}

impl From<Vector3D> for [f64; 3] {
    fn from(vector: Vector3D) -> [f64; 3] {
        [vector.x, vector.y, vector.z]
    }
}

impl Index<usize> for Vector3D {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("index out of bounds: the len is 3 but the index is {}", index),
        }
    }
}

impl IndexMut<usize> for Vector3D {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        match index {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("index out of bounds: the len is 3 but the index is {}", index),
        }
    }
}

/// Implement binary operations for all combinations of values and references
macro_rules! impl_binary_op {
    ($Op:ident, $op:ident, $lhs:ident, $rhs:ident, $res:expr) => {
        impl $Op<Vector3D> for Vector3D {
            type Output = Vector3D;
            #[inline]
            fn $op(self, $rhs: Vector3D) -> Vector3D {
                let $lhs = self;
                $res
            }
        }

        impl<'a> $Op<Vector3D> for &'a Vector3D {
            type Output = Vector3D;
            #[inline]
            fn $op(self, $rhs: Vector3D) -> Vector3D {
                let $lhs = *self;
                $res
            }
        }

        impl<'a> $Op<&'a Vector3D> for Vector3D {
            type Output = Vector3D;
            #[inline]
            fn $op(self, $rhs: &'a Vector3D) -> Vector3D {
                let $lhs = self;
                let $rhs = *$rhs;
                $res
            }
        }

        impl<'a, 'b> $Op<&'a Vector3D> for &'b Vector3D {
            type Output = Vector3D;
            #[inline]
            fn $op(self, $rhs: &'a Vector3D) -> Vector3D {
                let $lhs = *self;
                let $rhs = *$rhs;
                $res
            }
        }
    };
}

impl_binary_op!(Add, add, u, v, Vector3D::new(u.x + v.x, u.y + v.y, u.z + v.z));
impl_binary_op!(Sub, sub, u, v, Vector3D::new(u.x - v.x, u.y - v.y, u.z - v.z));

impl AddAssign<Vector3D> for Vector3D {
    #[inline]
    fn add_assign(&mut self, other: Vector3D) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl SubAssign<Vector3D> for Vector3D {
    #[inline]
    fn sub_assign(&mut self, other: Vector3D) {
        self.x -= other.x;
        self.y -= other.y;
        self.z -= other.z;
    }
}

impl Neg for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn neg(self) -> Vector3D {
        Vector3D::new(-self.x, -self.y, -self.z)
    }
}

/// Scalar (dot) product of two vectors
impl Mul<Vector3D> for Vector3D {
    type Output = f64;
    #[inline]
    fn mul(self, other: Vector3D) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

/// Scalar (dot) product of two vectors
impl<'a, 'b> Mul<&'a Vector3D> for &'b Vector3D {
    type Output = f64;
    #[inline]
    fn mul(self, other: &'a Vector3D) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

impl Mul<f64> for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn mul(self, scalar: f64) -> Vector3D {
        Vector3D::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Mul<Vector3D> for f64 {
    type Output = Vector3D;
    #[inline]
    fn mul(self, vector: Vector3D) -> Vector3D {
        Vector3D::new(self * vector.x, self * vector.y, self * vector.z)
    }
}

impl Div<f64> for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn div(self, scalar: f64) -> Vector3D {
        Vector3D::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

impl<'a> Div<f64> for &'a Vector3D {
    type Output = Vector3D;
    #[inline]
    fn div(self, scalar: f64) -> Vector3D {
        Vector3D::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

impl AbsDiffEq for Vector3D {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Vector3D, epsilon: f64) -> bool {
        f64::abs_diff_eq(&self.x, &other.x, epsilon)
            && f64::abs_diff_eq(&self.y, &other.y, epsilon)
            && f64::abs_diff_eq(&self.z, &other.z, epsilon)
    }
}

impl RelativeEq for Vector3D {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Vector3D, epsilon: f64, max_relative: f64) -> bool {
        f64::relative_eq(&self.x, &other.x, epsilon, max_relative)
            && f64::relative_eq(&self.y, &other.y, epsilon, max_relative)
            && f64::relative_eq(&self.z, &other.z, epsilon, max_relative)
    }
}

impl UlpsEq for Vector3D {
    fn default_max_ulps() -> u32 {
        f64::default_max_ulps()
    }

    fn ulps_eq(&self, other: &Vector3D, epsilon: f64, max_ulps: u32) -> bool {
        f64::ulps_eq(&self.x, &other.x, epsilon, max_ulps)
            && f64::ulps_eq(&self.y, &other.y, epsilon, max_ulps)
            && f64::ulps_eq(&self.z, &other.z, epsilon, max_ulps)
    }
}
