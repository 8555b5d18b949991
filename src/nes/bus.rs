// CPU-visible address space for the emulated cartridge: work RAM,
// expansion RAM (where tile memory lives), an editor scratch window and the
// MMC3-banked PRG windows.  While a level is loading, every fetch and store
// is also routed through the generator capture.

use std::sync::Arc;

use mos6502::memory::Bus;

use super::mmc3::{Mmc3, MMC3_REG_END};
use crate::capture::{HookState, LevelCapture};
use crate::stop::{StopReason, StopSignal};

// ─────────────────────────────────────────────────────────────────────────────
//  Memory map
// ─────────────────────────────────────────────────────────────────────────────

pub const MEM_A_START: u16 = 0x0000;
pub const MEM_A_END: u16 = 0x07FF;
pub const MEM_A_SIZE: usize = (MEM_A_END - MEM_A_START) as usize + 1;

/// Unused cartridge space the editor stages edited level data in.
pub const SCRATCH_START: u16 = 0x4020;
pub const SCRATCH_END: u16 = 0x5FFF;
pub const SCRATCH_SIZE: usize = (SCRATCH_END - SCRATCH_START) as usize + 1;

pub const MEM_B_START: u16 = 0x6000;
pub const MEM_B_END: u16 = 0x7FFF;
pub const MEM_B_SIZE: usize = (MEM_B_END - MEM_B_START) as usize + 1;

pub const PRG_START: u16 = 0x8000;

/// Reading the reset vector means the loader returned to the sentinel.
pub const RESET_VECTOR: u16 = 0xFFFC;
/// NMI/IRQ vectors all point at an RTI placed here.
pub const VECTOR_RTI: u16 = 0xFFF9;
const VECTORS_START: u16 = 0xFFFA;
const OPCODE_RTI: u8 = 0x40;

/// Stack seeded so the outermost RTS lands on `RESET_VECTOR`.
pub const STACK_SEED_SP: u8 = 0xFD;
pub const STACK_SEED: [(u16, u8); 2] = [(0x01FE, 0xFB), (0x01FF, 0xFF)];

pub struct CartridgeBus {
    ram_a: Box<[u8; MEM_A_SIZE]>,
    ram_b: Box<[u8; MEM_B_SIZE]>,
    scratch: Box<[u8; SCRATCH_SIZE]>,
    /// Scratch is only visible to the CPU while a level is loading.
    pub scratch_visible: bool,
    prg: Vec<u8>,
    pub mmc3: Mmc3,
    /// Present while a level load is being captured.
    pub capture: Option<LevelCapture>,
    stop: Arc<StopSignal>,
}

impl CartridgeBus {
    pub fn new(prg: Vec<u8>, stop: Arc<StopSignal>) -> Self {
        let mmc3 = Mmc3::new(prg.len());
        Self {
            ram_a: Box::new([0; MEM_A_SIZE]),
            ram_b: Box::new([0; MEM_B_SIZE]),
            scratch: Box::new([0; SCRATCH_SIZE]),
            scratch_visible: false,
            prg,
            mmc3,
            capture: None,
            stop,
        }
    }

    /// Power-on state: optional RAM clear, default banks, seeded stack.
    pub fn reset(&mut self, clear_ram: bool) {
        if clear_ram {
            self.ram_a.fill(0);
            self.ram_b.fill(0);
        }
        self.mmc3.reset();
        for (addr, value) in STACK_SEED {
            self.ram_a[addr as usize] = value;
        }
    }

    pub fn prg(&self) -> &[u8] {
        &self.prg
    }

    /// Swap in freshly assembled PRG of the same size.
    pub fn replace_prg(&mut self, prg: Vec<u8>) {
        self.prg = prg;
    }

    /// Stage data in the scratch window; the rest of the window is cleared.
    pub fn load_scratch(&mut self, data: &[u8]) -> Result<(), String> {
        if data.len() > SCRATCH_SIZE {
            return Err(format!(
                "{} bytes do not fit the {} byte scratch window",
                data.len(),
                SCRATCH_SIZE
            ));
        }
        self.scratch.fill(0);
        self.scratch[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn tile_memory(&self) -> &[u8] {
        &self.ram_b[..]
    }

    pub fn ram_byte(&self, addr: u16) -> u8 {
        self.ram_a[addr as usize & (MEM_A_SIZE - 1)]
    }

    pub fn set_ram_byte(&mut self, addr: u16, value: u8) {
        self.ram_a[addr as usize & (MEM_A_SIZE - 1)] = value;
    }

    /// Side-effect free read of whatever backs `addr`.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            MEM_A_START..=MEM_A_END => self.ram_a[(addr - MEM_A_START) as usize],
            SCRATCH_START..=SCRATCH_END if self.scratch_visible => {
                self.scratch[(addr - SCRATCH_START) as usize]
            }
            MEM_B_START..=MEM_B_END => self.ram_b[(addr - MEM_B_START) as usize],
            PRG_START..=0xFFFF => match self.mmc3.prg_offset(addr) {
                Some(off) if off < self.prg.len() => self.prg[off],
                _ => 0xFF,
            },
            _ => {
                log::warn!("Unhandled read from ${addr:04X}");
                0xFF
            }
        }
    }

    pub fn peek_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.peek(addr), self.peek(addr.wrapping_add(1))])
    }

    /// Loader state at a hook, read from the RAM variables.
    fn hook_state(&self, capture: &LevelCapture) -> HookState {
        let v = capture.vars();
        let lay_ptr = u16::from_le_bytes([self.ram_byte(v.lay_ptr_lo), self.ram_byte(v.lay_ptr_hi)]);
        let tile_base =
            u16::from_le_bytes([self.ram_byte(v.tile_addr_lo), self.ram_byte(v.tile_addr_hi)]);
        HookState {
            temp_var15: self.ram_byte(v.temp_var15),
            temp_var16: self.ram_byte(v.temp_var16),
            shape_def: self.ram_byte(v.shape_def),
            lay_ptr,
            tile_addr: tile_base.wrapping_add(self.ram_byte(v.tile_addr_off) as u16),
            next_byte: self.peek(lay_ptr),
        }
    }
}

impl Bus for CartridgeBus {
    fn get_byte(&mut self, address: u16) -> u8 {
        if let Some(capture) = self.capture.as_ref() {
            if let Some(kind) = capture.hook_kind(address) {
                let state = self.hook_state(capture);
                if let Some(capture) = self.capture.as_mut() {
                    capture.open(kind, &state);
                }
            }
        }

        match address {
            RESET_VECTOR => {
                self.stop.raise(StopReason::End);
                0xFF
            }
            VECTORS_START..=0xFFFF => {
                // Every vector points at $FFF9.
                if address & 1 != 0 {
                    0xFF
                } else {
                    0xF9
                }
            }
            VECTOR_RTI => OPCODE_RTI,
            _ => self.peek(address),
        }
    }

    fn set_byte(&mut self, address: u16, value: u8) {
        if self.capture.is_some() {
            let vertical = self
                .capture
                .as_ref()
                .map(|c| self.ram_byte(c.vars().vertical) != 0)
                .unwrap_or(false);
            let verdict = self
                .capture
                .as_mut()
                .and_then(|c| c.on_write(address, vertical));
            if let Some(reason) = verdict {
                log::warn!("Generator write to ${address:04X} out of range: {reason:?}");
                self.stop.raise(reason);
            }
        }

        match address {
            MEM_A_START..=MEM_A_END => self.ram_a[(address - MEM_A_START) as usize] = value,
            MEM_B_START..=MEM_B_END => self.ram_b[(address - MEM_B_START) as usize] = value,
            PRG_START..=MMC3_REG_END => {
                if address & 1 == 0 {
                    self.mmc3.write_command(value);
                } else {
                    self.mmc3.write_page(value);
                }
            }
            _ => log::warn!("Unhandled write ${value:02X} to ${address:04X}"),
        }
    }
}
