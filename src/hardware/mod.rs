//! Turntable drivers backing the [`Positioner`](crate::core::Positioner)
//! trait.

#[cfg(feature = "hardware_serial")]
pub mod cud3;
pub mod mock;
