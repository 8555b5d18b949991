//! NES cartridge plumbing: the iNES image, the assembler's symbol listing,
//! the MMC3 bank-select logic and the CPU-visible address space built on
//! top of them.

pub mod bus;
pub mod mmc3;
pub mod rom;
pub mod symbols;

pub use bus::CartridgeBus;
pub use mmc3::{Mmc3, MMC3_BANKSIZE};
pub use rom::RomImage;
pub use symbols::SymbolTable;
