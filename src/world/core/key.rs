//! Face-chunk addressing on the cubed sphere.
//!
//! A chunk is identified by the cube face it projects through, two tangent
//! tile indices along the face's right/up axes, and a radial shell index.
//! Keys are value types and are copied freely across threads.

use std::fmt;

/// Identity of one 64^3 chunk on the cubed sphere
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FaceChunkKey {
    /// Cube face, 0..6 (+X, -X, +Y, -Y, +Z, -Z)
    pub face: u8,
    /// Tangent tile index along the face right axis
    pub i: i64,
    /// Tangent tile index along the face up axis
    pub j: i64,
    /// Radial shell index
    pub k: i64,
}

impl FaceChunkKey {
    pub const fn new(face: u8, i: i64, j: i64, k: i64) -> Self {
        Self { face, i, j, k }
    }

    /// Key of the face-adjacent chunk offset by (di, dj, dk) on the same face
    #[inline]
    pub fn offset(self, di: i64, dj: i64, dk: i64) -> Self {
        Self {
            face: self.face,
            i: self.i + di,
            j: self.j + dj,
            k: self.k + dk,
        }
    }
}

impl fmt::Debug for FaceChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "f{}:{},{},{}",
            self.face, self.i, self.j, self.k
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &FaceChunkKey) -> u64 {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_equality_covers_all_fields() {
        let a = FaceChunkKey::new(2, 5, -3, 11);
        assert_eq!(a, FaceChunkKey::new(2, 5, -3, 11));
        assert_ne!(a, FaceChunkKey::new(3, 5, -3, 11));
        assert_ne!(a, FaceChunkKey::new(2, 6, -3, 11));
        assert_ne!(a, FaceChunkKey::new(2, 5, 3, 11));
        assert_ne!(a, FaceChunkKey::new(2, 5, -3, 12));
    }

    #[test]
    fn test_hash_distinguishes_shells() {
        let a = FaceChunkKey::new(0, 0, 0, 1);
        let b = FaceChunkKey::new(0, 0, 0, 2);
        assert_ne!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_offset_keeps_face() {
        let a = FaceChunkKey::new(4, 1, 2, 3).offset(-1, 0, 2);
        assert_eq!(a, FaceChunkKey::new(4, 0, 2, 5));
    }
}
