// Decode orchestration: set the emulated cartridge up the way the game
// would before loading a level or world map, run its loader, then read the
// rest of the level model straight out of memory.

use std::sync::Arc;

use mos6502::cpu::CPU;
use mos6502::instruction::Ricoh2a03;
use mos6502::memory::Bus;
use mos6502::registers::{StackPointer, Status};

use crate::capture::{CaptureVars, HookAddresses, LevelCapture};
use crate::config::Config;
use crate::error::CodecError;
use crate::level::{
    Level, LevelHeader, LevelObject, MapLink, LEVEL_HEADER_BYTES, MAP_OBJECT_BASE_ROW,
    MAX_MAP_LINKS, MOBJS_MAX, OBJS_MAX, PALETTE_SIZE, SCREEN_BYTESIZE_M, SCREEN_BYTESIZE_V,
    SCREEN_MCOUNT, SCREEN_WIDTH, TILEMEM_SIZE, TILESIZE, TILE_LAYOUT_COUNT,
};
use crate::nes::bus::STACK_SEED_SP;
use crate::nes::mmc3::{MMC3_CMD_PAGE_A000, MMC3_CMD_PAGE_C000, MMC3_COMMAND, MMC3_PAGE};
use crate::nes::{CartridgeBus, RomImage, SymbolTable};
use crate::ram::{RamMap, RamVar};
use crate::stop::{StopReason, StopSignal};

/// BG CHR pages the world map always uses.
const MAP_BG_PAGES: [u8; 2] = [20, 22];

/// What to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeTarget {
    /// A level layout at `layout` for `tileset` (1..).  `objects` is the
    /// object set address, or `None` to leave objects unread.
    Level {
        tileset: u8,
        layout: u16,
        objects: Option<u16>,
    },
    /// The world map of zero-based `world`.
    WorldMap { world: u8 },
}

/// Per-tileset lookup tables in the fixed bank.
#[derive(Debug, Clone, Copy)]
struct TilesetTables {
    page_a000: u16,
    page_c000: u16,
    bg_pages1: u16,
    bg_pages2: u16,
    tile_layout: u16,
    palette: u16,
}

impl TilesetTables {
    fn resolve(symbols: &SymbolTable) -> Result<Self, CodecError> {
        Ok(Self {
            page_a000: symbols.require("PAGE_A000_ByTileset")?,
            page_c000: symbols.require("PAGE_C000_ByTileset")?,
            bg_pages1: symbols.require("Level_BG_Pages1")?,
            bg_pages2: symbols.require("Level_BG_Pages2")?,
            tile_layout: symbols.require("TileLayout_ByTileset")?,
            palette: symbols.require("Palette_By_Tileset")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one emulated cartridge needs: CPU and memory, the image and
/// its symbols, resolved RAM variables, settings and the stop signal a
/// watchdog may raise from another thread.
pub struct EmulationContext {
    cpu: CPU<CartridgeBus, Ricoh2a03>,
    rom: RomImage,
    symbols: SymbolTable,
    ram: RamMap,
    config: Config,
    stop: Arc<StopSignal>,
}

impl EmulationContext {
    pub fn new(rom: RomImage, symbols: SymbolTable, config: Config) -> Result<Self, CodecError> {
        let ram = RamMap::resolve(&symbols)?;
        let stop = Arc::new(StopSignal::new());
        let bus = CartridgeBus::new(rom.prg.clone(), stop.clone());
        Ok(Self {
            cpu: CPU::new(bus, Ricoh2a03),
            rom,
            symbols,
            ram,
            config,
            stop,
        })
    }

    /// Load `<filebase>.nes` and `<filebase>.fns`.
    pub fn open(config: Config) -> Result<Self, CodecError> {
        let rom = RomImage::load(&config.rom_path()).map_err(CodecError::init)?;
        let symbols = SymbolTable::load(&config.symbols_path()).map_err(CodecError::init)?;
        Self::new(rom, symbols, config)
    }

    /// Pick up a rebuilt cartridge.  PRG must keep its size; symbols and
    /// RAM variables are re-resolved.  On error nothing is replaced.
    pub fn refresh(&mut self, rom_bytes: &[u8], symbols: SymbolTable) -> Result<(), CodecError> {
        let ram = RamMap::resolve(&symbols)?;
        let mut rom = self.rom.clone();
        rom.refresh_prg(rom_bytes).map_err(CodecError::init)?;
        self.cpu.memory.replace_prg(rom.prg.clone());
        self.rom = rom;
        self.symbols = symbols;
        self.ram = ram;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rom(&self) -> &RomImage {
        &self.rom
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    pub(crate) fn bus_mut(&mut self) -> &mut CartridgeBus {
        &mut self.cpu.memory
    }

    // ── Decoding ─────────────────────────────────────────────────────────

    pub fn decode(&mut self, target: DecodeTarget) -> Result<Level, CodecError> {
        let result = match target {
            DecodeTarget::Level {
                tileset,
                layout,
                objects,
            } => self.decode_level(tileset, layout, objects),
            DecodeTarget::WorldMap { world } => self.decode_world_map(world),
        };
        // Nothing outside a level load may see the scratch window or the
        // capture, whatever the outcome.
        let bus = self.bus_mut();
        bus.scratch_visible = false;
        bus.capture = None;
        result
    }

    /// Label-based entry.  For tileset 0 `layout_label` is the one-based
    /// world number and `object_label` is ignored.
    pub fn load_level(
        &mut self,
        tileset: u8,
        layout_label: &str,
        object_label: &str,
    ) -> Result<Level, CodecError> {
        let target = if tileset == 0 {
            let world = layout_label
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(|w| w.checked_sub(1))
                .ok_or_else(|| CodecError::init(format!("Invalid world number {layout_label}")))?;
            DecodeTarget::WorldMap { world }
        } else {
            DecodeTarget::Level {
                tileset,
                layout: self.symbols.require(layout_label)?,
                objects: Some(self.symbols.require(object_label)?),
            }
        };
        self.decode(target)
            .map_err(|e| e.context(&format!("loading {layout_label}")))
    }

    /// Bytes still free at the end of the bank holding `tileset`'s levels.
    pub fn tilebank_free_space(&mut self, tileset: u8) -> Result<usize, CodecError> {
        let table = self.symbols.require("PAGE_A000_ByTileset")?;
        let bank = self.read(table.wrapping_add(tileset as u16));
        Ok(self.rom.bank_free_space(bank))
    }

    fn decode_level(
        &mut self,
        tileset: u8,
        layout: u16,
        objects: Option<u16>,
    ) -> Result<Level, CodecError> {
        let tables = TilesetTables::resolve(&self.symbols)?;
        let entry = self.symbols.require("LevelLoad_ByTileset")?;
        let hooks = HookAddresses {
            junction: self.symbols.require("LoadLevel_StoreJctStart")?,
            variable: self.symbols.require("LeveLoad_Generators")?,
            fixed: self.symbols.require("LeveLoad_FixedSizeGens")?,
        };

        self.reset(true);
        let capture = LevelCapture::new(
            hooks,
            CaptureVars::from_ram(&self.ram),
            self.config.level_range_check_high,
        );
        let bus = self.bus_mut();
        bus.scratch_visible = true;
        bus.capture = Some(capture);

        let [lo, hi] = layout.to_le_bytes();
        self.write_var(RamVar::LayPtrLo, lo);
        self.write_var(RamVar::LayPtrHi, hi);
        self.write_var(RamVar::LevelTileset, tileset);
        self.select_tileset_pages(&tables, tileset);

        // Header is fixed layout; read it before the loader moves the pointer.
        let mut raw = [0u8; LEVEL_HEADER_BYTES];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = self.read(layout.wrapping_add(i as u16));
        }
        let mut level = Level::new(tileset);
        level.header = LevelHeader::from_bytes(&raw);

        let reason = self.run(entry);
        if reason != StopReason::End {
            return Err(CodecError::with_detail(
                reason,
                format!("level layout ${layout:04X}, tileset {tileset}"),
            ));
        }

        let lay_ptr = self.var_word(RamVar::LayPtrLo, RamVar::LayPtrHi);
        let capture = self
            .bus_mut()
            .capture
            .take()
            .ok_or_else(|| CodecError::init("level capture was not active"))?;
        let captured = capture.finish(lay_ptr);
        level.generators = captured.generators;
        level.tile_owner = captured.tile_owner;
        level.jct_y = captured.jct_y;
        level.jct_x = captured.jct_x;

        let h = &mut level.header;
        h.alt_level_tileset = self.var(RamVar::LevelAltTileset);
        h.is_vert = self.var(RamVar::Level7Vertical) != 0;
        h.total_screens = self.var(RamVar::LevelWidth).wrapping_add(1);
        h.vert_scroll = if h.is_vert {
            self.var(RamVar::VertScrollHi) as u16 * SCREEN_BYTESIZE_V / SCREEN_WIDTH * TILESIZE
        } else {
            self.var(RamVar::VertScroll) as u16
        };

        let bg_sel = self.var(RamVar::LevelBgPage12) as u16;
        level.bg_pages = [
            self.read(tables.bg_pages1.wrapping_add(bg_sel)),
            self.read(tables.bg_pages2.wrapping_add(bg_sel)),
        ];
        self.read_tiles_and_palettes(&mut level, &tables);

        level.layout_start = layout.wrapping_add(LEVEL_HEADER_BYTES as u16);
        level.layout_end = lay_ptr.wrapping_add(1);

        if let Some(addr) = objects {
            self.read_level_objects(&mut level, addr);
        }

        log::debug!(
            "Decoded layout ${:04X} (tileset {}): {} generators, {} bytes, {} objects",
            layout,
            tileset,
            level.generators.len(),
            level.layout_end.wrapping_sub(level.layout_start),
            level.objects.len()
        );
        Ok(level)
    }

    fn decode_world_map(&mut self, world: u8) -> Result<Level, CodecError> {
        let tables = TilesetTables::resolve(&self.symbols)?;
        let map_reload = self.symbols.require("Map_Reload_with_Completions")?;
        let map_init = self.symbols.require("Map_Init")?;

        // Map objects
        self.reset(true);
        self.write_var(RamVar::WorldNum, world);
        let tileset = self.var(RamVar::LevelTileset);
        self.select_tileset_pages(&tables, tileset);
        let reason = self.run(map_init);
        if reason != StopReason::End {
            return Err(CodecError::with_detail(
                reason,
                format!("world {} map init", world + 1),
            ));
        }

        // Map tiles
        self.reset(false);
        let page_c000 = self.var(RamVar::PageC000);
        self.set_pages(self.config.map_layout_bank, page_c000);
        let reason = self.run(map_reload);
        if reason != StopReason::End {
            return Err(CodecError::with_detail(
                reason,
                format!("world {} map tiles", world + 1),
            ));
        }

        let world_label = self.var(RamVar::WorldNum) as u16 + 1;
        let mut level = Level::new(0);
        level.header.total_screens = self.count_map_screens(world_label);
        level.header.vert_scroll = self.var(RamVar::VertScroll) as u16;
        level.bg_pages = MAP_BG_PAGES;
        self.read_tiles_and_palettes(&mut level, &tables);

        if self.config.warpzone_world != Some(world) {
            self.read_map_objects(&mut level);
        }
        self.read_map_links(&mut level, world_label)?;

        log::debug!(
            "Decoded world {}: {} screens, {} objects, {} links",
            world + 1,
            level.header.total_screens,
            level.objects.len(),
            level.map_links.len()
        );
        Ok(level)
    }

    // ── Direct reads ─────────────────────────────────────────────────────

    /// The map layout is raw tiles terminated by 0xFF.  Without the label
    /// (or with an empty layout) assume the maximum.
    fn count_map_screens(&mut self, world_label: u16) -> u8 {
        let Some(start) = self.symbols.resolve(&format!("W{world_label}_Map_Layout")) else {
            log::warn!("W{world_label}_Map_Layout not found, assuming {SCREEN_MCOUNT} screens");
            return SCREEN_MCOUNT as u8;
        };
        let limit = SCREEN_MCOUNT * SCREEN_BYTESIZE_M;
        let mut bytes = 0u16;
        while bytes < limit && self.read(start.wrapping_add(bytes)) != 0xFF {
            bytes += 1;
        }
        match bytes / SCREEN_BYTESIZE_M {
            0 => SCREEN_MCOUNT as u8,
            n => n as u8,
        }
    }

    fn read_tiles_and_palettes(&mut self, level: &mut Level, tables: &TilesetTables) {
        level.tiles = self.cpu.memory.tile_memory()[..TILEMEM_SIZE].to_vec();
        let tileset = level.tileset as u16;

        let layout = self.read_word(tables.tile_layout.wrapping_add(tileset * 2));
        for quarter in 0..4 {
            for tile in 0..TILE_LAYOUT_COUNT {
                let addr = layout.wrapping_add((quarter * TILE_LAYOUT_COUNT + tile) as u16);
                level.tile_layout[tile][quarter] = self.read(addr);
            }
        }

        let page_c000 = self.var(RamVar::PageC000);
        self.set_pages(self.config.palette_bank, page_c000);
        let base = self.read_word(tables.palette.wrapping_add(tileset * 2));
        let bg = base.wrapping_add(self.var(RamVar::PalSelTileColors) as u16 * PALETTE_SIZE as u16);
        let spr = base.wrapping_add(self.var(RamVar::PalSelObjColors) as u16 * PALETTE_SIZE as u16);
        for c in 0..PALETTE_SIZE {
            level.bg_palette[c] = self.read(bg.wrapping_add(c as u16));
            level.spr_palette[c] = self.read(spr.wrapping_add(c as u16));
        }
    }

    fn read_level_objects(&mut self, level: &mut Level, addr: u16) {
        let page_a000 = self.var(RamVar::PageA000);
        self.set_pages(page_a000, self.config.object_bank);

        level.object_unknown = self.read(addr);
        let first = addr.wrapping_add(1);
        level.objects.clear();
        for i in 0..OBJS_MAX {
            let at = first.wrapping_add((i * 3) as u16);
            let id = self.read(at);
            if id == 0xFF {
                break;
            }
            level.objects.push(LevelObject {
                id,
                col: self.read(at.wrapping_add(1)),
                row: self.read(at.wrapping_add(2)),
            });
        }
    }

    fn read_map_objects(&mut self, level: &mut Level) {
        level.objects.clear();
        for i in 0..MOBJS_MAX {
            let x = u16::from_le_bytes([
                self.var_at(RamVar::MapObjectsXLo, i),
                self.var_at(RamVar::MapObjectsXHi, i),
            ]);
            let y = self.var_at(RamVar::MapObjectsY, i);
            level.objects.push(LevelObject {
                id: self.var_at(RamVar::MapObjectsIds, i),
                col: (x / TILESIZE) as u8,
                row: (y / TILESIZE as u8).wrapping_sub(MAP_OBJECT_BASE_ROW),
            });
            level.map_object_items[i] = self.var_at(RamVar::MapObjectsItm, i);
        }
    }

    /// The cartridge stores no link count.  The row/type table is assumed
    /// to end where the screen/column table begins, which holds for the
    /// stock layout but is not guaranteed by anything in the data.
    fn read_map_links(&mut self, level: &mut Level, world_label: u16) -> Result<(), CodecError> {
        let by_row_type = self.symbols.require(&format!("W{world_label}_ByRowType"))?;
        let by_scr_col = self.symbols.require(&format!("W{world_label}_ByScrCol"))?;
        let obj_sets = self.symbols.require(&format!("W{world_label}_ObjSets"))?;
        let level_layout = self.symbols.require(&format!("W{world_label}_LevelLayout"))?;

        let mut count = by_scr_col.wrapping_sub(by_row_type) as usize;
        if count > MAX_MAP_LINKS {
            log::warn!("W{world_label}: inferred {count} map links, keeping {MAX_MAP_LINKS}");
            count = MAX_MAP_LINKS;
        }

        let page_c000 = self.var(RamVar::PageC000);
        self.set_pages(self.config.map_layout_bank, page_c000);
        level.map_links = (0..count as u16)
            .map(|i| MapLink {
                row_tileset: self.read(by_row_type.wrapping_add(i)),
                col_hi: self.read(by_scr_col.wrapping_add(i)),
                object_addr: self.read_word(obj_sets.wrapping_add(i * 2)),
                layout_addr: self.read_word(level_layout.wrapping_add(i * 2)),
            })
            .collect();
        Ok(())
    }

    // ── Emulation plumbing ───────────────────────────────────────────────

    fn reset(&mut self, clear_ram: bool) {
        self.cpu.memory.reset(clear_ram);
        self.cpu.memory.capture = None;
        self.cpu.memory.scratch_visible = false;

        let r = &mut self.cpu.registers;
        r.accumulator = 0;
        r.index_x = 0;
        r.index_y = 0;
        r.stack_pointer = StackPointer(STACK_SEED_SP);
        r.status.insert(Status::PS_DISABLE_INTERRUPTS);
        r.status.remove(Status::PS_DECIMAL_MODE);

        self.stop.reset();
    }

    /// Run from `entry` until something stops the CPU.
    fn run(&mut self, entry: u16) -> StopReason {
        self.cpu.registers.program_counter = entry;
        while !self.stop.is_stopped() {
            self.cpu.single_step();
        }
        self.stop.get()
    }

    /// What the game's `PRGROM_Change_Both2` does: record the pages in RAM
    /// and issue the two bank-select sequences.
    fn set_pages(&mut self, page_a000: u8, page_c000: u8) {
        self.write_var(RamVar::PageA000, page_a000);
        self.write_var(RamVar::PageC000, page_c000);
        let bus = self.bus_mut();
        bus.set_byte(MMC3_COMMAND, MMC3_CMD_PAGE_A000);
        bus.set_byte(MMC3_PAGE, page_a000);
        bus.set_byte(MMC3_COMMAND, MMC3_CMD_PAGE_C000);
        bus.set_byte(MMC3_PAGE, page_c000);
    }

    fn select_tileset_pages(&mut self, tables: &TilesetTables, tileset: u8) {
        let page_a000 = self.read(tables.page_a000.wrapping_add(tileset as u16));
        let page_c000 = self.read(tables.page_c000.wrapping_add(tileset as u16));
        self.set_pages(page_a000, page_c000);
    }

    fn read(&self, addr: u16) -> u8 {
        self.cpu.memory.peek(addr)
    }

    fn read_word(&self, addr: u16) -> u16 {
        self.cpu.memory.peek_word(addr)
    }

    fn var(&self, var: RamVar) -> u8 {
        self.cpu.memory.ram_byte(self.ram.addr(var))
    }

    fn var_at(&self, var: RamVar, i: usize) -> u8 {
        self.cpu.memory.ram_byte(self.ram.index(var, i))
    }

    fn var_word(&self, lo: RamVar, hi: RamVar) -> u16 {
        u16::from_le_bytes([self.var(lo), self.var(hi)])
    }

    fn write_var(&mut self, var: RamVar, value: u8) {
        let addr = self.ram.addr(var);
        self.cpu.memory.set_ram_byte(addr, value);
    }
}
