//! Hardware-revision quirks.
//!
//! Rev-4 chips lost synapse drivers 110..=113; the silicon still answers
//! reads on them, but with bogus data. Readback verification has to exclude
//! the affected rows or it reports phantom mismatches.

use crate::geometry::ROWS_PER_DRIVER;

/// First dead synapse driver on rev-4 chips.
pub const FIRST_DEAD_DRIVER_V4: usize = 110;
/// Last dead synapse driver on rev-4 chips.
pub const LAST_DEAD_DRIVER_V4: usize = 113;

/// Whether a synapse driver is unusable on the given chip revision.
pub const fn synapse_driver_unusable(version: u32, driver: usize) -> bool {
    version == 4 && driver >= FIRST_DEAD_DRIVER_V4 && driver <= LAST_DEAD_DRIVER_V4
}

/// Whether a synapse row belongs to an unusable driver on the given revision.
pub const fn synapse_row_unusable(version: u32, row: usize) -> bool {
    synapse_driver_unusable(version, row / ROWS_PER_DRIVER)
}
