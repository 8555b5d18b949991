//! Generator capture: turns the loader's memory traffic into generator
//! records.
//!
//! The level loader dispatches every record to one of three routines.  The
//! opcode fetch at a routine's entry point is the signal that a new record
//! is about to be drawn; at that moment the loader has already parsed the
//! record's bytes into RAM variables, so id and parameters can be lifted
//! from there without knowing the stream's bit layout.  Tile-memory writes
//! that follow are attributed to that record until the next entry.

use crate::level::geometry::tile_pixel;
use crate::level::{
    Generator, GeneratorKind, GeneratorList, GEN_MAX_PARAMS, LEVEL_JCT_STARTS, NO_OWNER,
    TILEMEM_BASE, TILEMEM_END, TILEMEM_SIZE, TILESIZE,
};
use crate::nes::bus::{MEM_B_END, MEM_B_START, SCRATCH_START};
use crate::ram::{RamMap, RamVar};
use crate::stop::StopReason;

/// Loader routine entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookAddresses {
    /// `LoadLevel_StoreJctStart`
    pub junction: u16,
    /// `LeveLoad_Generators`
    pub variable: u16,
    /// `LeveLoad_FixedSizeGens`
    pub fixed: u16,
}

/// RAM variables read at each hook.
#[derive(Debug, Clone, Copy)]
pub struct CaptureVars {
    pub temp_var15: u16,
    pub temp_var16: u16,
    pub shape_def: u16,
    pub lay_ptr_lo: u16,
    pub lay_ptr_hi: u16,
    pub tile_addr_lo: u16,
    pub tile_addr_hi: u16,
    pub tile_addr_off: u16,
    pub vertical: u16,
}

impl CaptureVars {
    pub fn from_ram(ram: &RamMap) -> Self {
        Self {
            temp_var15: ram.addr(RamVar::TempVar15),
            temp_var16: ram.addr(RamVar::TempVar16),
            shape_def: ram.addr(RamVar::ShapeDef),
            lay_ptr_lo: ram.addr(RamVar::LayPtrLo),
            lay_ptr_hi: ram.addr(RamVar::LayPtrHi),
            tile_addr_lo: ram.addr(RamVar::MapTileAddrLo),
            tile_addr_hi: ram.addr(RamVar::MapTileAddrHi),
            tile_addr_off: ram.addr(RamVar::TileAddrOff),
            vertical: ram.addr(RamVar::Level7Vertical),
        }
    }
}

/// Loader state at a hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookState {
    pub temp_var15: u8,
    pub temp_var16: u8,
    pub shape_def: u8,
    /// Stream pointer, already past the record's three leading bytes.
    pub lay_ptr: u16,
    /// `Map_Tile_Addr + TileAddr_Off`
    pub tile_addr: u16,
    /// Byte at `lay_ptr`, the optional extra parameter.
    pub next_byte: u8,
}

/// Every record starts with three bytes; the loader has consumed them by
/// the time a hook fires.
const RECORD_HEAD: u16 = 3;

#[derive(Debug, Clone)]
pub struct LevelCapture {
    hooks: HookAddresses,
    vars: CaptureVars,
    range_check_high: u16,
    generators: Vec<Generator>,
    /// Stream address where the open (last) generator began.
    open_start: Option<u16>,
    tile_owner: Vec<u16>,
    jct_y: [u8; LEVEL_JCT_STARTS],
    jct_x: [u8; LEVEL_JCT_STARTS],
}

/// What a finished capture hands to the level model.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub generators: GeneratorList,
    pub tile_owner: Vec<u16>,
    pub jct_y: [u8; LEVEL_JCT_STARTS],
    pub jct_x: [u8; LEVEL_JCT_STARTS],
}

impl LevelCapture {
    pub fn new(hooks: HookAddresses, vars: CaptureVars, range_check_high: u16) -> Self {
        Self {
            hooks,
            vars,
            range_check_high,
            generators: Vec::new(),
            open_start: None,
            tile_owner: vec![NO_OWNER; TILEMEM_SIZE],
            jct_y: [0xFF; LEVEL_JCT_STARTS],
            jct_x: [0xFF; LEVEL_JCT_STARTS],
        }
    }

    pub fn vars(&self) -> CaptureVars {
        self.vars
    }

    pub fn hook_kind(&self, addr: u16) -> Option<GeneratorKind> {
        if addr == self.hooks.variable {
            Some(GeneratorKind::Variable)
        } else if addr == self.hooks.fixed {
            Some(GeneratorKind::Fixed)
        } else if addr == self.hooks.junction {
            Some(GeneratorKind::JunctionStart)
        } else {
            None
        }
    }

    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// A loader routine was entered: close the previous record and open a
    /// new one from the loader's parsed state.
    pub fn open(&mut self, kind: GeneratorKind, s: &HookState) {
        self.close_open(s.lay_ptr, RECORD_HEAD);

        let mut gen = match kind {
            GeneratorKind::Variable => {
                // Shape top nibble is the id within its group of 15, plus one.
                let group = (s.temp_var15 >> 5) as u16 * 15;
                let id = (group + (s.shape_def >> 4) as u16).wrapping_sub(1) as u8;
                let mut g = Generator::new(kind, id);
                g.params = [s.shape_def & 0x0F, s.next_byte];
                g
            }
            GeneratorKind::Fixed => {
                let id = ((s.temp_var15 & 0xE0) >> 1).wrapping_add(s.shape_def);
                Generator::new(kind, id)
            }
            GeneratorKind::JunctionStart => {
                let id = s.temp_var15 & 0x0F;
                self.jct_y[id as usize] = s.temp_var16;
                self.jct_x[id as usize] = s.shape_def;
                let mut g = Generator::new(kind, id);
                g.params = [s.temp_var16, s.shape_def];
                g
            }
        };
        // Junctions draw nothing; the tile address is left over from the
        // previous record.
        if kind != GeneratorKind::JunctionStart {
            gen.address_start = s.tile_addr;
        }
        gen.sequence_index = self.generators.len() as u16;

        log::trace!(
            "capture: #{} {:?} id {} at ${:04X} (stream ${:04X})",
            gen.sequence_index,
            kind,
            gen.id,
            gen.address_start,
            s.lay_ptr.wrapping_sub(RECORD_HEAD)
        );

        self.generators.push(gen);
        self.open_start = Some(s.lay_ptr.wrapping_sub(RECORD_HEAD));
    }

    /// Record size is the distance from its start to the current stream
    /// position, less `back` bytes already belonging to the next record.
    fn close_open(&mut self, lay_ptr: u16, back: u16) {
        let Some(start) = self.open_start.take() else {
            return;
        };
        if let Some(g) = self.generators.last_mut() {
            g.byte_size = lay_ptr.wrapping_sub(start).wrapping_sub(back);
            g.bounds.pad(TILESIZE);
            // The byte peeked at the hook only belongs to a record that
            // actually consumed it.
            if g.kind == GeneratorKind::Variable && (g.byte_size as usize) < 2 + GEN_MAX_PARAMS {
                g.params[1..].fill(0);
            }
        }
    }

    /// Check and attribute a CPU write.  Returns a stop reason if the write
    /// is outside what a generator may touch.
    pub fn on_write(&mut self, addr: u16, vertical: bool) -> Option<StopReason> {
        let verdict = if (SCRATCH_START..MEM_B_START).contains(&addr) {
            Some(StopReason::OutOfRangeWriteLow)
        } else if addr > TILEMEM_END && addr <= self.range_check_high {
            Some(StopReason::OutOfRangeWriteHigh)
        } else {
            None
        };

        if (MEM_B_START..=MEM_B_END).contains(&addr) && self.open_start.is_some() {
            let index = self.generators.len() as u16 - 1;
            if let Some(g) = self.generators.last_mut() {
                g.address_min = g.address_min.min(addr);
                g.address_max = g.address_max.max(addr);
                if g.kind != GeneratorKind::JunctionStart {
                    let (x, y) = tile_pixel(addr, vertical);
                    g.bounds.extend(x, y);
                }
                if addr <= TILEMEM_END {
                    self.tile_owner[(addr - TILEMEM_BASE) as usize] = index;
                }
            }
        }

        verdict
    }

    /// The loader returned; `lay_ptr` points at the terminator.
    pub fn finish(mut self, lay_ptr: u16) -> CaptureResult {
        self.close_open(lay_ptr, 0);
        CaptureResult {
            generators: self.generators.into_iter().collect(),
            tile_owner: self.tile_owner,
            jct_y: self.jct_y,
            jct_x: self.jct_x,
        }
    }
}
