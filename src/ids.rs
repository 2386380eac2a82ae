//! Integer identifiers and the registry that hands them out.

use std::fmt;

macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_id! {
    /// Unique ID of a [Vehicle](crate::Vehicle), assigned in creation order.
    pub struct VehicleId(u64);
}

typed_id! {
    /// Unique ID of a [RoadSideUnit](crate::RoadSideUnit).
    pub struct RsuId(u32);
}

/// Hands out monotonically increasing IDs for the lifetime of one simulation run.
#[derive(Clone, Debug)]
pub struct IdRegistry {
    next_vehicle: u64,
    next_rsu: u32,
}

impl IdRegistry {
    /// The first vehicle ID of a run.
    pub const INITIAL_ID: u64 = 1;

    /// Creates a registry starting at [Self::INITIAL_ID].
    pub fn new() -> Self {
        Self {
            next_vehicle: Self::INITIAL_ID,
            next_rsu: Self::INITIAL_ID as u32,
        }
    }

    /// Restarts numbering, as at the start of a new run.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Restarts vehicle numbering only, keeping the IDs of existing road side units unique.
    pub fn reset_vehicles(&mut self) {
        self.next_vehicle = Self::INITIAL_ID;
    }

    pub fn next_vehicle_id(&mut self) -> VehicleId {
        let id = VehicleId(self.next_vehicle);
        self.next_vehicle += 1;
        id
    }

    pub fn next_rsu_id(&mut self) -> RsuId {
        let id = RsuId(self.next_rsu);
        self.next_rsu += 1;
        id
    }

    /// The number of vehicles created since the last reset.
    pub fn vehicles_created(&self) -> u64 {
        self.next_vehicle - Self::INITIAL_ID
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_reset() {
        let mut ids = IdRegistry::new();
        let a = ids.next_vehicle_id();
        let b = ids.next_vehicle_id();
        assert!(b > a);
        assert_eq!(ids.vehicles_created(), 2);

        ids.reset();
        assert_eq!(ids.next_vehicle_id(), a);
        assert_eq!(ids.vehicles_created(), 1);
    }
}
