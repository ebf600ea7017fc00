//! Chip-family patchers: LKS32, ES32, N32. Each owns a [`crate::base::PatchBuffer`]
//! and implements the checksum layout and shared helpers specific to its
//! family; model patchers compose these with concrete signatures.

pub mod es32;
pub mod lks32;
pub mod n32;
