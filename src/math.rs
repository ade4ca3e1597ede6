// math.rs - Minimal TRS/blend vocabulary the animation pipeline needs: Vec3,
// Quat, 4x4 matrix, epsilon-compare helpers. Not a general math library
// (Non-goal) — only what skeletal blending and world-matrix propagation use.
//
// `Vec3` keeps the teacher's `animation/mod.rs::Vec3` shape (repr(C, align(16)),
// lerp/normalize/dot, operator overloads); `Quat`/`Mat4` are new, grounded in
// `original_source/.../Graphics/Mesh/AnimationTree.{h,cpp}`'s `glm::quat`/
// `glm::mat4` usage (slerp, mix, node-local-to-world composition).

use serde::{Deserialize, Serialize};

pub const EPSILON: f32 = 1e-4;

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    _padding: f32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<Vec3>(), 16);

impl Vec3 {
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, _padding: 0.0 }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub const fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    #[inline]
    pub fn lerp(self, other: Vec3, t: f32) -> Vec3 {
        Vec3::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    #[inline]
    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn approx_eq(self, other: Vec3, eps: f32) -> bool {
        (self.x - other.x).abs() <= eps && (self.y - other.y).abs() <= eps && (self.z - other.z).abs() <= eps
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Vec3::zero()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// Hamilton quaternion, `w` scalar-first as in the original's `glm::quat(w, x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quat {
    #[inline]
    pub const fn identity() -> Self {
        Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 }
    }

    #[inline]
    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    #[inline]
    pub fn dot(self, o: Quat) -> f32 {
        self.w * o.w + self.x * o.x + self.y * o.y + self.z * o.z
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn normalize(self) -> Quat {
        let len = self.length();
        if len <= EPSILON {
            return Quat::identity();
        }
        let inv = 1.0 / len;
        Quat::new(self.w * inv, self.x * inv, self.y * inv, self.z * inv)
    }

    #[inline]
    fn scale(self, s: f32) -> Quat {
        Quat::new(self.w * s, self.x * s, self.y * s, self.z * s)
    }

    #[inline]
    fn add(self, o: Quat) -> Quat {
        Quat::new(self.w + o.w, self.x + o.x, self.y + o.y, self.z + o.z)
    }

    #[inline]
    fn neg(self) -> Quat {
        Quat::new(-self.w, -self.x, -self.y, -self.z)
    }

    /// Spherical linear interpolation, matching `glm::slerp` (shortest path,
    /// falls back to `mix`+renormalize when the angle is tiny).
    pub fn slerp(self, other: Quat, t: f32) -> Quat {
        let mut cos_theta = self.dot(other);
        let mut b = other;
        if cos_theta < 0.0 {
            cos_theta = -cos_theta;
            b = other.neg();
        }

        if cos_theta > 1.0 - EPSILON {
            return self.scale(1.0 - t).add(b.scale(t)).normalize();
        }

        let theta = cos_theta.acos();
        let sin_theta = theta.sin();
        let w_a = ((1.0 - t) * theta).sin() / sin_theta;
        let w_b = (t * theta).sin() / sin_theta;
        self.scale(w_a).add(b.scale(w_b)).normalize()
    }

    /// Rotates `v` by this (unit) quaternion.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let qv = Vec3::new(self.x, self.y, self.z);
        let uv = Vec3::new(
            qv.y * v.z - qv.z * v.y,
            qv.z * v.x - qv.x * v.z,
            qv.x * v.y - qv.y * v.x,
        );
        let uuv = Vec3::new(
            qv.y * uv.z - qv.z * uv.y,
            qv.z * uv.x - qv.x * uv.z,
            qv.x * uv.y - qv.y * uv.x,
        );
        v + (uv * self.w + uuv) * 2.0
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::identity()
    }
}

/// Column-major 4x4 matrix, composed the way `glm::translate * rotate * scale` is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [[f32; 4]; 4]);

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Builds a TRS composition matrix: translate(t) * rotate(r) * scale(s).
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
        let Quat { w, x, y, z } = rotation.normalize();
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);

        let rot = [
            [1.0 - (yy + zz), xy + wz, xz - wy],
            [xy - wz, 1.0 - (xx + zz), yz + wx],
            [xz + wy, yz - wx, 1.0 - (xx + yy)],
        ];

        let mut m = Mat4::IDENTITY;
        for col in 0..3 {
            for row in 0..3 {
                m.0[col][row] = rot[col][row] * [scale.x, scale.y, scale.z][col];
            }
        }
        m.0[3][0] = translation.x;
        m.0[3][1] = translation.y;
        m.0[3][2] = translation.z;
        m
    }

    /// Column-major 4x4 matrix product `self * rhs`.
    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = Mat4([[0.0; 4]; 4]);
        for col in 0..4 {
            for row in 0..4 {
                let mut acc = 0.0;
                for k in 0..4 {
                    acc += self.0[k][row] * rhs.0[col][k];
                }
                out.0[col][row] = acc;
            }
        }
        out
    }

    /// Affine inverse assuming no shear (translate/rotate/uniform-or-nonuniform
    /// scale only) — sufficient for skeleton root-relative joint matrices.
    pub fn inverse_affine(&self) -> Mat4 {
        let m = &self.0;
        // 3x3 linear part inverse via cofactors, then fold the translation.
        let a = [[m[0][0], m[1][0], m[2][0]], [m[0][1], m[1][1], m[2][1]], [m[0][2], m[1][2], m[2][2]]];
        let det = a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
            - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
            + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0]);
        if det.abs() <= EPSILON {
            return Mat4::IDENTITY;
        }
        let inv_det = 1.0 / det;
        let inv_t = [
            [
                (a[1][1] * a[2][2] - a[1][2] * a[2][1]) * inv_det,
                (a[0][2] * a[2][1] - a[0][1] * a[2][2]) * inv_det,
                (a[0][1] * a[1][2] - a[0][2] * a[1][1]) * inv_det,
            ],
            [
                (a[1][2] * a[2][0] - a[1][0] * a[2][2]) * inv_det,
                (a[0][0] * a[2][2] - a[0][2] * a[2][0]) * inv_det,
                (a[0][2] * a[1][0] - a[0][0] * a[1][2]) * inv_det,
            ],
            [
                (a[1][0] * a[2][1] - a[1][1] * a[2][0]) * inv_det,
                (a[0][1] * a[2][0] - a[0][0] * a[2][1]) * inv_det,
                (a[0][0] * a[1][1] - a[0][1] * a[1][0]) * inv_det,
            ],
        ];

        let t = Vec3::new(m[3][0], m[3][1], m[3][2]);
        let inv_t_vec = Vec3::new(
            -(inv_t[0][0] * t.x + inv_t[1][0] * t.y + inv_t[2][0] * t.z),
            -(inv_t[0][1] * t.x + inv_t[1][1] * t.y + inv_t[2][1] * t.z),
            -(inv_t[0][2] * t.x + inv_t[1][2] * t.y + inv_t[2][2] * t.z),
        );

        let mut out = Mat4::IDENTITY;
        for col in 0..3 {
            for row in 0..3 {
                out.0[col][row] = inv_t[col][row];
            }
        }
        out.0[3][0] = inv_t_vec.x;
        out.0[3][1] = inv_t_vec.y;
        out.0[3][2] = inv_t_vec.z;
        out
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Mat4::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::zero();
        let b = Vec3::new(2.0, 4.0, 6.0);
        assert_eq!(a.lerp(b, 0.5), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn quat_slerp_endpoints() {
        let a = Quat::identity();
        let b = Quat::new(0.0, 0.0, 1.0, 0.0);
        let at0 = a.slerp(b, 0.0);
        assert!((at0.w - a.w).abs() < 1e-3);
        let at1 = a.slerp(b, 1.0);
        assert!((at1.x - b.x).abs() < 1e-3);
    }

    #[test]
    fn mat4_identity_trs_roundtrip() {
        let m = Mat4::from_trs(Vec3::new(1.0, 2.0, 3.0), Quat::identity(), Vec3::one());
        assert_eq!(m.0[3][0], 1.0);
        assert_eq!(m.0[3][1], 2.0);
        assert_eq!(m.0[3][2], 3.0);
    }

    #[test]
    fn mat4_inverse_affine_cancels_translation() {
        let m = Mat4::from_trs(Vec3::new(5.0, -2.0, 1.0), Quat::identity(), Vec3::one());
        let inv = m.inverse_affine();
        let prod = m.mul(&inv);
        assert!((prod.0[3][0]).abs() < 1e-3);
        assert!((prod.0[3][1]).abs() < 1e-3);
        assert!((prod.0[3][2]).abs() < 1e-3);
    }
}
