use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a voxel material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MaterialId(pub u16);

// Safe because MaterialId is just a u16
unsafe impl bytemuck::Pod for MaterialId {}
unsafe impl bytemuck::Zeroable for MaterialId {}

impl Default for MaterialId {
    fn default() -> Self {
        MaterialId::AIR
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MaterialId::AIR => write!(f, "Air"),
            MaterialId::ROCK => write!(f, "Rock"),
            MaterialId::DIRT => write!(f, "Dirt"),
            MaterialId::WATER => write!(f, "Water"),
            MaterialId::LAVA => write!(f, "Lava"),
            _ => write!(f, "Material({})", self.0),
        }
    }
}

impl MaterialId {
    /// The non-solid sentinel. Everything else occupies its voxel.
    pub const AIR: MaterialId = MaterialId(0);
    pub const ROCK: MaterialId = MaterialId(1);
    pub const DIRT: MaterialId = MaterialId(2);
    pub const WATER: MaterialId = MaterialId(3);
    pub const LAVA: MaterialId = MaterialId(4);

    /// Create a MaterialId from a raw u16 value
    pub const fn new(id: u16) -> Self {
        MaterialId(id)
    }

    #[inline]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Result of sampling the procedural base world at one voxel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseSample {
    pub material: MaterialId,
    pub density: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_sentinel() {
        assert!(MaterialId::AIR.is_air());
        assert!(!MaterialId::ROCK.is_air());
        assert_eq!(MaterialId::default(), MaterialId::AIR);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(MaterialId::DIRT.to_string(), "Dirt");
        assert_eq!(MaterialId::new(900).to_string(), "Material(900)");
    }
}
