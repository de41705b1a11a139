//! Slot map

use heapless::Vec;

use super::{ImageIndex, SlotAssignment, SlotKey, SlotRole};
use crate::error::{Error, Result};
use crate::layout::{RegionId, RegionTable};
use crate::MAX_SLOTS;

/// Validated `(image, role) -> region` mapping
///
/// Every declared role exists for every declared image, and no two slots
/// share a region. Both properties are checked once in [`SlotMap::build`];
/// queries only look keys up.
#[derive(Debug, Clone, Default)]
pub struct SlotMap {
    /// Sorted by key
    entries: Vec<SlotAssignment, MAX_SLOTS>,
}

impl SlotMap {
    /// Build a slot map from explicit assignments
    ///
    /// # Errors
    /// * `DanglingSlotReference` - Region is not in the table
    /// * `DuplicateSlot` - Same `(image, role)` assigned twice
    /// * `SlotAliasing` - Two slots share one region
    /// * `MissingSlot` - A declared role is missing for an image in
    ///   `0..image_count`, where the count runs up to the highest image seen
    /// * `TableFull` - More than [`MAX_SLOTS`] assignments
    pub fn build<I>(table: &RegionTable, assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = SlotAssignment>,
    {
        let mut entries: Vec<SlotAssignment, MAX_SLOTS> = Vec::new();

        for slot in assignments {
            if table.lookup(slot.region).is_err() {
                return Err(Error::DanglingSlotReference {
                    slot: slot.key,
                    region: slot.region,
                });
            }
            if entries.iter().any(|e| e.key == slot.key) {
                return Err(Error::DuplicateSlot(slot.key));
            }
            if let Some(first) = entries.iter().find(|e| e.region == slot.region) {
                return Err(Error::SlotAliasing {
                    first: first.key,
                    second: slot.key,
                    region: slot.region,
                });
            }
            entries.push(slot).map_err(|_| Error::TableFull)?;
        }

        entries.sort_unstable_by_key(|e| e.key);
        let map = Self { entries };
        map.check_complete()?;

        log::debug!(
            "Built slot map: {} slots over {} images",
            map.len(),
            map.image_count()
        );
        Ok(map)
    }

    /// Build a slot map by numbering convention
    ///
    /// Image `i`, role at position `p` of `roles` maps to region
    /// `first_region + i * roles.len() + p`.
    ///
    /// # Errors
    /// As [`SlotMap::build`], plus `UnknownSlot` when the numbering runs past
    /// the largest region id.
    pub fn from_convention(
        table: &RegionTable,
        first_region: RegionId,
        image_count: u8,
        roles: &[SlotRole],
    ) -> Result<Self> {
        let mut assignments: Vec<SlotAssignment, MAX_SLOTS> = Vec::new();

        for image in 0..image_count {
            for (position, &role) in roles.iter().enumerate() {
                let key = SlotKey::new(ImageIndex(image), role);
                let id = first_region.0 as usize + image as usize * roles.len() + position;
                let region = u8::try_from(id)
                    .map(RegionId)
                    .map_err(|_| Error::unknown_slot(key))?;
                assignments
                    .push(SlotAssignment { key, region })
                    .map_err(|_| Error::TableFull)?;
            }
        }

        Self::build(table, assignments)
    }

    /// Resolve a slot to its region
    ///
    /// This is a pure lookup; repeated calls return the same region.
    pub fn resolve(&self, image: ImageIndex, role: SlotRole) -> Result<RegionId> {
        let key = SlotKey::new(image, role);
        self.entries
            .binary_search_by_key(&key, |e| e.key)
            .map(|i| self.entries[i].region)
            .map_err(|_| Error::unknown_slot(key))
    }

    /// Resolve a slot ordinal of image 0 (0 primary, 1 secondary, 2 scratch)
    pub fn resolve_index(&self, slot: u8) -> Result<RegionId> {
        self.resolve_image_index(ImageIndex(0), slot)
    }

    /// Resolve a slot ordinal of the given image
    pub fn resolve_image_index(&self, image: ImageIndex, slot: u8) -> Result<RegionId> {
        let role = SlotRole::from_index(slot).ok_or(Error::UnknownSlot { image, slot })?;
        self.resolve(image, role)
    }

    /// Find the slot a region is assigned to, if any
    pub fn slot_of(&self, region: RegionId) -> Option<SlotKey> {
        self.entries
            .iter()
            .find(|e| e.region == region)
            .map(|e| e.key)
    }

    /// Number of configured images
    ///
    /// Images are numbered from 0 without gaps, so this is one past the
    /// highest image index.
    pub fn image_count(&self) -> usize {
        self.entries
            .last()
            .map_or(0, |e| e.key.image.0 as usize + 1)
    }

    /// Check if a role is declared
    pub fn has_role(&self, role: SlotRole) -> bool {
        self.entries.iter().any(|e| e.key.role == role)
    }

    /// Iterate over assignments ordered by image, then role
    pub fn iter(&self) -> impl Iterator<Item = &SlotAssignment> {
        self.entries.iter()
    }

    /// Get the number of slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no slots are configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_complete(&self) -> Result<()> {
        for image in (0..self.image_count()).map(|i| ImageIndex(i as u8)) {
            for role in SlotRole::ALL {
                if self.has_role(role) && self.resolve(image, role).is_err() {
                    return Err(Error::MissingSlot(SlotKey::new(image, role)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceDescriptor, DeviceId, DeviceRegistry};
    use crate::layout::RegionDescriptor;
    use proptest::prelude::*;

    fn table(count: u8) -> RegionTable {
        let mut registry = DeviceRegistry::new();
        registry
            .register(DeviceDescriptor::new(DeviceId(0), 4, 4096))
            .unwrap();
        RegionTable::build(
            &registry,
            (0..count).map(|i| {
                RegionDescriptor::uniform(RegionId(i), DeviceId(0), i as u32 * 4096, 4096, 4096)
            }),
        )
        .unwrap()
    }

    const ROLES: [SlotRole; 2] = [SlotRole::Primary, SlotRole::Secondary];

    fn assign(image: u8, role: SlotRole, region: u8) -> SlotAssignment {
        SlotAssignment::new(ImageIndex(image), role, RegionId(region))
    }

    #[test]
    fn test_single_image() {
        let slots = SlotMap::build(
            &table(4),
            [
                assign(0, SlotRole::Primary, 1),
                assign(0, SlotRole::Secondary, 2),
                assign(0, SlotRole::Scratch, 3),
            ],
        )
        .unwrap();

        assert_eq!(slots.resolve(ImageIndex(0), SlotRole::Primary), Ok(RegionId(1)));
        assert_eq!(slots.resolve_index(1), Ok(RegionId(2)));
        assert_eq!(slots.resolve_index(2), Ok(RegionId(3)));
        assert_eq!(
            slots.resolve_index(3),
            Err(Error::UnknownSlot {
                image: ImageIndex(0),
                slot: 3
            })
        );
        assert_eq!(
            slots.resolve(ImageIndex(1), SlotRole::Primary),
            Err(Error::unknown_slot(SlotKey::new(ImageIndex(1), SlotRole::Primary)))
        );
        assert_eq!(slots.image_count(), 1);
        assert_eq!(
            slots.slot_of(RegionId(3)),
            Some(SlotKey::new(ImageIndex(0), SlotRole::Scratch))
        );
        assert_eq!(slots.slot_of(RegionId(0)), None);
    }

    #[test]
    fn test_aliasing_rejected() {
        let err = SlotMap::build(
            &table(4),
            [
                assign(0, SlotRole::Primary, 1),
                assign(0, SlotRole::Secondary, 2),
                assign(1, SlotRole::Primary, 1),
                assign(1, SlotRole::Secondary, 3),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::SlotAliasing {
                first: SlotKey::new(ImageIndex(0), SlotRole::Primary),
                second: SlotKey::new(ImageIndex(1), SlotRole::Primary),
                region: RegionId(1),
            }
        );
        assert!(err.is_build_error());
    }

    #[test]
    fn test_duplicate_slot() {
        assert_eq!(
            SlotMap::build(
                &table(4),
                [assign(0, SlotRole::Primary, 1), assign(0, SlotRole::Primary, 2)]
            )
            .unwrap_err(),
            Error::DuplicateSlot(SlotKey::new(ImageIndex(0), SlotRole::Primary))
        );
    }

    #[test]
    fn test_dangling_region() {
        assert_eq!(
            SlotMap::build(&table(2), [assign(0, SlotRole::Primary, 9)]).unwrap_err(),
            Error::DanglingSlotReference {
                slot: SlotKey::new(ImageIndex(0), SlotRole::Primary),
                region: RegionId(9),
            }
        );
    }

    #[test]
    fn test_missing_role_for_image() {
        assert_eq!(
            SlotMap::build(
                &table(4),
                [
                    assign(0, SlotRole::Primary, 0),
                    assign(0, SlotRole::Secondary, 1),
                    assign(1, SlotRole::Primary, 2),
                ]
            )
            .unwrap_err(),
            Error::MissingSlot(SlotKey::new(ImageIndex(1), SlotRole::Secondary))
        );
    }

    #[test]
    fn test_image_gap_rejected() {
        let err = SlotMap::build(
            &table(4),
            [
                assign(0, SlotRole::Primary, 0),
                assign(2, SlotRole::Primary, 2),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::MissingSlot(SlotKey::new(ImageIndex(1), SlotRole::Primary))
        );
    }

    #[test]
    fn test_unknown_ordinal() {
        let slots = SlotMap::build(&table(1), [assign(0, SlotRole::Primary, 0)]).unwrap();

        for slot in [1, 2, 7, u8::MAX] {
            let err = slots.resolve_index(slot).unwrap_err();
            assert!(matches!(err, Error::UnknownSlot { .. }), "{:?}", err);
            assert_eq!(
                err,
                Error::UnknownSlot {
                    image: ImageIndex(0),
                    slot
                }
            );
        }
        assert_eq!(
            slots.resolve_image_index(ImageIndex(3), 0),
            Err(Error::UnknownSlot {
                image: ImageIndex(3),
                slot: 0
            })
        );
    }

    #[test]
    fn test_convention() {
        let slots = SlotMap::from_convention(
            &table(6),
            RegionId(2),
            2,
            &[SlotRole::Primary, SlotRole::Secondary],
        )
        .unwrap();

        assert_eq!(slots.len(), 4);
        assert_eq!(slots.image_count(), 2);
        assert_eq!(slots.resolve(ImageIndex(0), SlotRole::Primary), Ok(RegionId(2)));
        assert_eq!(slots.resolve(ImageIndex(0), SlotRole::Secondary), Ok(RegionId(3)));
        assert_eq!(slots.resolve(ImageIndex(1), SlotRole::Primary), Ok(RegionId(4)));
        assert_eq!(
            slots.resolve_image_index(ImageIndex(1), 1),
            Ok(RegionId(5))
        );
        assert!(!slots.has_role(SlotRole::Scratch));
    }

    #[test]
    fn test_convention_past_table() {
        assert_eq!(
            SlotMap::from_convention(&table(3), RegionId(1), 2, &ROLES).unwrap_err(),
            Error::DanglingSlotReference {
                slot: SlotKey::new(ImageIndex(1), SlotRole::Primary),
                region: RegionId(3),
            }
        );
    }

    #[test]
    fn test_convention_id_overflow() {
        assert_eq!(
            SlotMap::from_convention(&table(1), RegionId(255), 1, &ROLES).unwrap_err(),
            Error::unknown_slot(SlotKey::new(ImageIndex(0), SlotRole::Secondary))
        );
    }

    proptest! {
        #[test]
        fn prop_no_two_slots_share_a_region(
            picks in prop::collection::vec((0u8..4, 0u8..3, 0u8..12), 1..12)
        ) {
            let assignments = picks.iter().map(|&(image, role, region)| {
                assign(image, SlotRole::from_index(role).unwrap(), region)
            });

            if let Ok(slots) = SlotMap::build(&table(12), assignments) {
                let entries: std::vec::Vec<_> = slots.iter().collect();
                for (i, a) in entries.iter().enumerate() {
                    for b in entries.iter().skip(i + 1) {
                        prop_assert_ne!(a.region, b.region);
                    }
                    // lookup is pure
                    prop_assert_eq!(slots.resolve(a.key.image, a.key.role), Ok(a.region));
                    prop_assert_eq!(slots.resolve(a.key.image, a.key.role), Ok(a.region));
                }
            }
        }
    }
}
