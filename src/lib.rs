//! NoDice level codec.
//!
//! Levels in the cartridge are stored as a compact "generator" bytecode that
//! only the game's own loader understands.  Instead of reimplementing that
//! loader, the codec runs it on an emulated 6502 and watches the memory
//! traffic: three entry points of the loader mark the start of each
//! generator, and every tile-memory write is attributed to whichever
//! generator is open at the time.  The encoder is the exact inverse, and
//! every edit is validated by feeding the re-encoded bytes back through the
//! real loader.

pub mod capture;
pub mod config;
pub mod decode;
pub mod edit;
pub mod encode;
pub mod error;
pub mod level;
pub mod nes;
pub mod ram;
pub mod stop;

#[cfg(test)]
pub(crate) mod test_cart;

pub use config::Config;
pub use decode::{DecodeTarget, EmulationContext};
pub use edit::Editor;
pub use encode::encode;
pub use error::CodecError;
pub use level::{Generator, GeneratorKind, Level, LevelHeader};
pub use stop::{StopReason, StopSignal, Watchdog};
