//! Slot types

use core::fmt;

use crate::layout::RegionId;

/// Index of a firmware image in a multi-image configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(transparent))]
pub struct ImageIndex(pub u8);

impl fmt::Display for ImageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a slot in the upgrade scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum SlotRole {
    /// Slot the image runs from
    Primary,
    /// Slot a new image is downloaded into
    Secondary,
    /// Swap scratch area
    Scratch,
}

impl SlotRole {
    /// All roles in ordinal order
    pub const ALL: [SlotRole; 3] = [Self::Primary, Self::Secondary, Self::Scratch];

    /// Ordinal used by single-index slot APIs (0, 1, 2)
    pub const fn index(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
            Self::Scratch => 2,
        }
    }

    /// Role for a slot ordinal
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Primary),
            1 => Some(Self::Secondary),
            2 => Some(Self::Scratch),
            _ => None,
        }
    }

    /// Lowercase role name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Scratch => "scratch",
        }
    }

    /// Parse a role name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical key of a slot
///
/// Ordered by image first, then role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    /// Image index
    pub image: ImageIndex,
    /// Slot role
    pub role: SlotRole,
}

impl SlotKey {
    /// Create a slot key
    pub const fn new(image: ImageIndex, role: SlotRole) -> Self {
        Self { image, role }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image {} {} slot", self.image, self.role)
    }
}

/// Assignment of a region to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAssignment {
    /// Slot being assigned
    pub key: SlotKey,
    /// Region backing the slot
    pub region: RegionId,
}

impl SlotAssignment {
    /// Create a slot assignment
    pub const fn new(image: ImageIndex, role: SlotRole, region: RegionId) -> Self {
        Self {
            key: SlotKey::new(image, role),
            region,
        }
    }
}
