// Synthetic MMC3 cartridge for tests.
//
// A few hand-assembled routines stand in for the game's level loader,
// generators and world-map setup.  They follow the same RAM conventions
// (stream pointer, parsed record bytes, tile base plus offset) so the
// capture sees exactly what it would see on the real cartridge, but the
// "generators" only draw simple patterns:
//
// - variable: `p0 + 1` tiles in a row; shape group 2 eats one extra stream
//   byte and group 3 and up eat two
// - fixed: two tiles, one above the other, except for a few shapes that
//   misbehave on purpose (write below or above tile memory, spin forever)
// - junction: stores its coordinates in two RAM tables

use std::collections::HashMap;

use crate::config::Config;
use crate::decode::EmulationContext;
use crate::nes::mmc3::MMC3_BANKSIZE;
use crate::nes::{RomImage, SymbolTable};

pub const PRG_BANKS: usize = 32;

/// Level header with recognisable alternate pointers and zeroed options.
pub const HEADER: [u8; 9] = [0x34, 0x12, 0x78, 0x56, 0, 0, 0, 0, 0];

pub const FIXED_TILE: u8 = 0x51;
pub const VAR_TILE: u8 = 0x52;
/// Fixed shapes that misbehave.
pub const SHAPE_SPIN: u8 = 0x0C;
pub const SHAPE_WRITE_HIGH: u8 = 0x0D;
pub const SHAPE_WRITE_LOW: u8 = 0x0E;

pub const BG_PAGES1: [u8; 4] = [0x60, 0x61, 0x62, 0x63];
pub const BG_PAGES2: [u8; 4] = [0x70, 0x71, 0x72, 0x73];

/// Where the first level sits inside its bank.
pub const LEVEL_BANK_OFFSET: usize = 0;
const LEVEL_BANK: usize = 1;
const OBJECT_BANK: usize = 6;
const MAP_BANK: usize = 12;
const PALETTE_BANK: usize = 27;
const TABLE_BANK: usize = 30;
const CODE_BANK: usize = 31;

pub const MAP_LAYOUT: [u8; 0x90] = map_layout();
pub const MAP_ROW_TYPE: [u8; 3] = [0x21, 0x42, 0x63];
pub const MAP_SCR_COL: [u8; 3] = [0x01, 0x05, 0x12];

const fn map_layout() -> [u8; 0x90] {
    let mut out = [0u8; 0x90];
    let mut i = 0;
    while i < out.len() {
        out[i] = (i % 0x50) as u8 + 1;
        i += 1;
    }
    out
}

/// `HEADER` followed by `records`.
pub fn with_header(records: &[u8]) -> Vec<u8> {
    let mut v = HEADER.to_vec();
    v.extend_from_slice(records);
    v
}

// ─────────────────────────────────────────────────────────────────────────────
//  RAM layout
// ─────────────────────────────────────────────────────────────────────────────

const T15: u8 = 0x00;
const T16: u8 = 0x01;
const SHAPE: u8 = 0x02;
const LAY_PTR: u8 = 0x03;
const TILE_ADDR: u8 = 0x05;
const TILE_OFF: u8 = 0x07;
const VERTICAL: u8 = 0x09;
const WIDTH: u8 = 0x0A;
const VSCROLL: u8 = 0x0B;
const PALSEL_TILE: u8 = 0x10;
const ALT_TILESET: u8 = 0x12;
const BG_PAGE_SEL: u8 = 0x13;
const TEMP: u8 = 0x16;
const MOBJ_ITM: u8 = 0x20;
const MOBJ_Y: u8 = 0x30;
const MOBJ_XLO: u8 = 0x40;
const MOBJ_XHI: u8 = 0x50;
const MOBJ_IDS: u8 = 0x60;
const JCT_Y: u16 = 0x0300;
const JCT_X: u16 = 0x0310;

const RAM_LABELS: &[(&str, u16)] = &[
    ("Temp_Var15", T15 as u16),
    ("Temp_Var16", T16 as u16),
    ("LL_ShapeDef", SHAPE as u16),
    ("Level_LayPtr_AddrL", LAY_PTR as u16),
    ("Level_LayPtr_AddrH", LAY_PTR as u16 + 1),
    ("Map_Tile_AddrL", TILE_ADDR as u16),
    ("Map_Tile_AddrH", TILE_ADDR as u16 + 1),
    ("TileAddr_Off", TILE_OFF as u16),
    ("Level_Tileset", 0x08),
    ("Level_7Vertical", VERTICAL as u16),
    ("Level_Width", WIDTH as u16),
    ("Vert_Scroll", VSCROLL as u16),
    ("Vert_Scroll_Hi", 0x0C),
    ("PAGE_C000", 0x0D),
    ("PAGE_A000", 0x0E),
    ("World_Num", 0x0F),
    ("PalSel_Tile_Colors", PALSEL_TILE as u16),
    ("PalSel_Obj_Colors", 0x11),
    ("Level_AltTileset", ALT_TILESET as u16),
    ("Level_BG_Page1_2", BG_PAGE_SEL as u16),
    ("Map_Objects_Itm", MOBJ_ITM as u16),
    ("Map_Objects_Y", MOBJ_Y as u16),
    ("Map_Objects_XLo", MOBJ_XLO as u16),
    ("Map_Objects_XHi", MOBJ_XHI as u16),
    ("Map_Objects_IDs", MOBJ_IDS as u16),
];

// ── Fixed-bank tables ($8000) ────────────────────────────────────────────

const PAGE_A000_TABLE: u16 = 0x8100;
const PAGE_C000_TABLE: u16 = 0x8110;
const TILE_LAYOUT_TABLE: u16 = 0x8200;
const BG_PAGES1_TABLE: u16 = 0x8300;
const BG_PAGES2_TABLE: u16 = 0x8310;
const TILE_LAYOUT_DATA: u16 = 0x8400;
const MOBJ_TABLES: u16 = 0x8800;
const SCREEN_LO: u16 = 0x8900;
const SCREEN_HI: u16 = 0x8910;
const VSCREEN_LO: u16 = 0x8920;
const VSCREEN_HI: u16 = 0x8930;

const PALETTE_TABLE: u16 = 0xA000;
const PALETTE_DATA: u16 = 0xA010;

// ─────────────────────────────────────────────────────────────────────────────
//  Assembler
// ─────────────────────────────────────────────────────────────────────────────

mod op {
    pub const LDA_IMM: u8 = 0xA9;
    pub const LDA_ZP: u8 = 0xA5;
    pub const LDA_IND_Y: u8 = 0xB1;
    pub const LDA_ABS_X: u8 = 0xBD;
    pub const STA_ZP: u8 = 0x85;
    pub const STA_ZP_X: u8 = 0x95;
    pub const STA_ABS: u8 = 0x8D;
    pub const STA_ABS_X: u8 = 0x9D;
    pub const STA_IND_Y: u8 = 0x91;
    pub const LDY_IMM: u8 = 0xA0;
    pub const LDY_ZP: u8 = 0xA4;
    pub const LDX_IMM: u8 = 0xA2;
    pub const AND_IMM: u8 = 0x29;
    pub const ORA_ZP: u8 = 0x05;
    pub const CMP_IMM: u8 = 0xC9;
    pub const CPX_IMM: u8 = 0xE0;
    pub const ADC_IMM: u8 = 0x69;
    pub const CLC: u8 = 0x18;
    pub const LSR_A: u8 = 0x4A;
    pub const ASL_A: u8 = 0x0A;
    pub const TAX: u8 = 0xAA;
    pub const TAY: u8 = 0xA8;
    pub const TXA: u8 = 0x8A;
    pub const TYA: u8 = 0x98;
    pub const INX: u8 = 0xE8;
    pub const INY: u8 = 0xC8;
    pub const DEX: u8 = 0xCA;
    pub const INC_ZP: u8 = 0xE6;
    pub const BEQ: u8 = 0xF0;
    pub const BNE: u8 = 0xD0;
    pub const BCC: u8 = 0x90;
    pub const BPL: u8 = 0x10;
    pub const JSR: u8 = 0x20;
    pub const JMP: u8 = 0x4C;
    pub const RTS: u8 = 0x60;
}

enum Fixup {
    Abs,
    Rel,
}

/// Just enough of a two-pass assembler for the routines below.
struct Asm {
    base: u16,
    code: Vec<u8>,
    labels: HashMap<&'static str, u16>,
    fixups: Vec<(usize, &'static str, Fixup)>,
}

impl Asm {
    fn new(base: u16) -> Self {
        Self {
            base,
            code: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
        }
    }

    fn label(&mut self, name: &'static str) -> &mut Self {
        let pc = self.base + self.code.len() as u16;
        assert!(self.labels.insert(name, pc).is_none(), "duplicate label {name}");
        self
    }

    fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    /// Immediate or zero-page operand.
    fn byte(&mut self, opcode: u8, value: u8) -> &mut Self {
        self.code.extend_from_slice(&[opcode, value]);
        self
    }

    fn abs(&mut self, opcode: u8, addr: u16) -> &mut Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&addr.to_le_bytes());
        self
    }

    fn abs_to(&mut self, opcode: u8, target: &'static str) -> &mut Self {
        self.code.push(opcode);
        self.fixups.push((self.code.len(), target, Fixup::Abs));
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    fn branch(&mut self, opcode: u8, target: &'static str) -> &mut Self {
        self.code.push(opcode);
        self.fixups.push((self.code.len(), target, Fixup::Rel));
        self.code.push(0);
        self
    }

    /// `INC lo; BNE +; INC hi; +:` on a zero-page pointer.
    fn inc_ptr(&mut self, zp: u8, skip: &'static str) -> &mut Self {
        self.byte(op::INC_ZP, zp)
            .branch(op::BNE, skip)
            .byte(op::INC_ZP, zp + 1)
            .label(skip)
    }

    /// `ptr += n` on a zero-page pointer.
    fn add_ptr(&mut self, zp: u8, n: u8, skip: &'static str) -> &mut Self {
        self.byte(op::LDA_ZP, zp)
            .op(op::CLC)
            .byte(op::ADC_IMM, n)
            .byte(op::STA_ZP, zp)
            .branch(op::BCC, skip)
            .byte(op::INC_ZP, zp + 1)
            .label(skip)
    }

    fn finish(mut self) -> (Vec<u8>, HashMap<&'static str, u16>) {
        for (at, target, kind) in std::mem::take(&mut self.fixups) {
            let dest = *self
                .labels
                .get(target)
                .unwrap_or_else(|| panic!("undefined label {target}"));
            match kind {
                Fixup::Abs => self.code[at..at + 2].copy_from_slice(&dest.to_le_bytes()),
                Fixup::Rel => {
                    let next = self.base as i32 + at as i32 + 1;
                    let delta = dest as i32 - next;
                    assert!((-128..=127).contains(&delta), "branch to {target} out of range");
                    self.code[at] = delta as i8 as u8;
                }
            }
        }
        (self.code, self.labels)
    }
}

/// Loader, generators and world-map routines, at $E000.  With
/// `spin_map_reload` the map tile routine never returns.
fn assemble_code(spin_map_reload: bool) -> (Vec<u8>, HashMap<&'static str, u16>) {
    let mut a = Asm::new(0xE000);

    // ── Level loader ──
    a.label("LevelLoad_ByTileset")
        .byte(op::LDY_IMM, 4)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .op(op::TAX)
        .byte(op::AND_IMM, 0x0F)
        .byte(op::STA_ZP, WIDTH)
        .op(op::TXA)
        .byte(op::AND_IMM, 0x80)
        .byte(op::STA_ZP, VERTICAL)
        .op(op::INY)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .byte(op::STA_ZP, PALSEL_TILE)
        .op(op::INY)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .byte(op::STA_ZP, ALT_TILESET)
        .op(op::INY)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .byte(op::STA_ZP, BG_PAGE_SEL)
        .op(op::INY)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .byte(op::STA_ZP, VSCROLL)
        .add_ptr(LAY_PTR, 9, "ll_header_done");

    a.label("ll_next")
        .byte(op::LDY_IMM, 0)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .byte(op::CMP_IMM, 0xFF)
        .branch(op::BNE, "ll_record")
        .op(op::RTS)
        .label("ll_record")
        .byte(op::STA_ZP, T15)
        .op(op::INY)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .byte(op::STA_ZP, T16)
        .op(op::INY)
        .byte(op::LDA_IND_Y, LAY_PTR)
        .byte(op::STA_ZP, SHAPE)
        .add_ptr(LAY_PTR, 3, "ll_ptr_done")
        .byte(op::LDA_ZP, T15)
        .byte(op::AND_IMM, 0xE0)
        .byte(op::CMP_IMM, 0xE0)
        .branch(op::BNE, "ll_generator")
        .abs_to(op::JSR, "LoadLevel_StoreJctStart")
        .abs_to(op::JMP, "ll_next")
        .label("ll_generator")
        .abs_to(op::JSR, "ll_tile_addr")
        .byte(op::LDA_ZP, SHAPE)
        .byte(op::AND_IMM, 0xF0)
        .branch(op::BEQ, "ll_fixed")
        .abs_to(op::JSR, "LeveLoad_Generators")
        .abs_to(op::JMP, "ll_next")
        .label("ll_fixed")
        .abs_to(op::JSR, "LeveLoad_FixedSizeGens")
        .abs_to(op::JMP, "ll_next");

    // Map_Tile_Addr from the screen nibble, TileAddr_Off from row/column.
    a.label("ll_tile_addr")
        .byte(op::LDA_ZP, T16)
        .op(op::LSR_A)
        .op(op::LSR_A)
        .op(op::LSR_A)
        .op(op::LSR_A)
        .op(op::TAX)
        .byte(op::LDA_ZP, VERTICAL)
        .branch(op::BNE, "ta_vertical")
        .abs(op::LDA_ABS_X, SCREEN_LO)
        .byte(op::STA_ZP, TILE_ADDR)
        .abs(op::LDA_ABS_X, SCREEN_HI)
        .byte(op::STA_ZP, TILE_ADDR + 1)
        .byte(op::LDA_ZP, T15)
        .byte(op::AND_IMM, 0x10)
        .branch(op::BEQ, "ta_offset")
        .byte(op::INC_ZP, TILE_ADDR + 1)
        .abs_to(op::JMP, "ta_offset")
        .label("ta_vertical")
        .abs(op::LDA_ABS_X, VSCREEN_LO)
        .byte(op::STA_ZP, TILE_ADDR)
        .abs(op::LDA_ABS_X, VSCREEN_HI)
        .byte(op::STA_ZP, TILE_ADDR + 1)
        .label("ta_offset")
        .byte(op::LDA_ZP, T15)
        .op(op::ASL_A)
        .op(op::ASL_A)
        .op(op::ASL_A)
        .op(op::ASL_A)
        .byte(op::STA_ZP, TEMP)
        .byte(op::LDA_ZP, T16)
        .byte(op::AND_IMM, 0x0F)
        .byte(op::ORA_ZP, TEMP)
        .byte(op::STA_ZP, TILE_OFF)
        .op(op::RTS);

    // ── Generators ──
    a.label("LeveLoad_Generators")
        .byte(op::LDA_ZP, SHAPE)
        .byte(op::AND_IMM, 0x0F)
        .op(op::TAX)
        .byte(op::LDY_ZP, TILE_OFF)
        .byte(op::LDA_IMM, VAR_TILE)
        .label("vg_loop")
        .byte(op::STA_IND_Y, TILE_ADDR)
        .op(op::INY)
        .op(op::DEX)
        .branch(op::BPL, "vg_loop")
        .byte(op::LDA_ZP, SHAPE)
        .op(op::LSR_A)
        .op(op::LSR_A)
        .op(op::LSR_A)
        .op(op::LSR_A)
        .byte(op::CMP_IMM, 2)
        .branch(op::BCC, "vg_done")
        .branch(op::BEQ, "vg_one_extra")
        .inc_ptr(LAY_PTR, "vg_extra_2")
        .label("vg_one_extra")
        .inc_ptr(LAY_PTR, "vg_extra_1")
        .label("vg_done")
        .op(op::RTS);

    a.label("LeveLoad_FixedSizeGens")
        .byte(op::LDA_ZP, SHAPE)
        .byte(op::CMP_IMM, SHAPE_WRITE_LOW)
        .branch(op::BNE, "fg_not_low")
        .abs(op::STA_ABS, 0x5FFF)
        .op(op::RTS)
        .label("fg_not_low")
        .byte(op::CMP_IMM, SHAPE_WRITE_HIGH)
        .branch(op::BNE, "fg_not_high")
        .abs(op::STA_ABS, 0x7950)
        .op(op::RTS)
        .label("fg_not_high")
        .byte(op::CMP_IMM, SHAPE_SPIN)
        .branch(op::BNE, "fg_draw")
        .label("fg_spin")
        .abs_to(op::JMP, "fg_spin")
        .label("fg_draw")
        .byte(op::LDY_ZP, TILE_OFF)
        .byte(op::LDA_IMM, FIXED_TILE)
        .byte(op::STA_IND_Y, TILE_ADDR)
        .op(op::TYA)
        .op(op::CLC)
        .byte(op::ADC_IMM, 16)
        .op(op::TAY)
        .byte(op::LDA_IMM, FIXED_TILE)
        .byte(op::STA_IND_Y, TILE_ADDR)
        .op(op::RTS);

    a.label("LoadLevel_StoreJctStart")
        .byte(op::LDA_ZP, T15)
        .byte(op::AND_IMM, 0x0F)
        .op(op::TAX)
        .byte(op::LDA_ZP, T16)
        .abs(op::STA_ABS_X, JCT_Y)
        .byte(op::LDA_ZP, SHAPE)
        .abs(op::STA_ABS_X, JCT_X)
        .op(op::RTS);

    // ── World map ──
    a.label("Map_Init").byte(op::LDX_IMM, 8).label("mi_loop");
    for (i, zp) in [MOBJ_IDS, MOBJ_ITM, MOBJ_Y, MOBJ_XLO, MOBJ_XHI].into_iter().enumerate() {
        a.abs(op::LDA_ABS_X, MOBJ_TABLES + i as u16 * 0x10)
            .byte(op::STA_ZP_X, zp);
    }
    a.op(op::DEX).branch(op::BPL, "mi_loop").op(op::RTS);

    a.label("Map_Reload_with_Completions");
    if spin_map_reload {
        a.label("mr_spin").abs_to(op::JMP, "mr_spin");
    }
    a.byte(op::LDX_IMM, 0)
        .label("mr_loop")
        .abs(op::LDA_ABS_X, 0xA000)
        .abs(op::STA_ABS_X, 0x6110)
        .op(op::INX)
        .byte(op::CPX_IMM, 0x90)
        .branch(op::BNE, "mr_loop")
        .op(op::RTS);

    a.finish()
}

// ─────────────────────────────────────────────────────────────────────────────
//  Cartridge builder
// ─────────────────────────────────────────────────────────────────────────────

pub struct TestCart {
    levels: Vec<(String, Vec<u8>)>,
    objects: Vec<(String, Vec<u8>)>,
    removed: Vec<String>,
    spin_map_reload: bool,
    config: Config,
}

/// An assembled image plus its listing.
pub struct BuiltCart {
    pub image: Vec<u8>,
    pub symbols: SymbolTable,
    pub config: Config,
}

impl TestCart {
    pub fn new() -> Self {
        Self {
            levels: Vec::new(),
            objects: Vec::new(),
            removed: Vec::new(),
            spin_map_reload: false,
            config: Config::default(),
        }
    }

    /// Level data (header included), placed in the tileset 1 bank.
    pub fn level(mut self, label: &str, data: &[u8]) -> Self {
        self.levels.push((label.to_string(), data.to_vec()));
        self
    }

    /// Object set bytes, placed in the object bank.  `Objs` defaults to an
    /// empty set.
    pub fn objects(mut self, label: &str, data: &[u8]) -> Self {
        self.objects.push((label.to_string(), data.to_vec()));
        self
    }

    pub fn without_symbol(mut self, label: &str) -> Self {
        self.removed.push(label.to_string());
        self
    }

    /// World 1's `Map_Reload_with_Completions` loops forever.
    pub fn spin_map_reload(mut self) -> Self {
        self.spin_map_reload = true;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(mut self) -> BuiltCart {
        if !self.objects.iter().any(|(l, _)| l == "Objs") {
            self.objects.push(("Objs".to_string(), vec![0x00, 0xFF]));
        }

        let mut prg = vec![0xFFu8; PRG_BANKS * MMC3_BANKSIZE];
        let mut symbols = SymbolTable::default();
        for &(name, addr) in RAM_LABELS {
            symbols.insert(name, addr);
        }

        let (code, labels) = assemble_code(self.spin_map_reload);
        put(&mut prg, CODE_BANK, 0xE000, &code);
        for (name, addr) in labels {
            symbols.insert(name, addr);
        }

        // Fixed-bank tables.
        let mut table = |addr: u16, label: Option<&str>, bytes: &[u8]| {
            put(&mut prg, TABLE_BANK, addr, bytes);
            if let Some(l) = label {
                symbols.insert(l, addr);
            }
        };
        table(PAGE_A000_TABLE, Some("PAGE_A000_ByTileset"), &[MAP_BANK as u8 - 1, LEVEL_BANK as u8]);
        table(PAGE_C000_TABLE, Some("PAGE_C000_ByTileset"), &[10, 2]);
        let layout_ptr = TILE_LAYOUT_DATA.to_le_bytes();
        table(
            TILE_LAYOUT_TABLE,
            Some("TileLayout_ByTileset"),
            &[layout_ptr[0], layout_ptr[1], layout_ptr[0], layout_ptr[1]],
        );
        table(BG_PAGES1_TABLE, Some("Level_BG_Pages1"), &BG_PAGES1);
        table(BG_PAGES2_TABLE, Some("Level_BG_Pages2"), &BG_PAGES2);
        let layout: Vec<u8> = (0..4u16)
            .flat_map(|q| (0..256u16).map(move |t| (t ^ q) as u8))
            .collect();
        table(TILE_LAYOUT_DATA, None, &layout);

        let mut ids = [0u8; 9];
        let mut items = [0u8; 9];
        let mut ys = [0u8; 9];
        let mut xlo = [0u8; 9];
        let mut xhi = [0u8; 9];
        for i in 0..9 {
            let x = (i as u16 * 2 + 1) * 16;
            ids[i] = 0x40 + i as u8;
            items[i] = 0x80 + i as u8;
            ys[i] = (i as u8 + 3) * 16;
            xlo[i] = x as u8;
            xhi[i] = (x >> 8) as u8;
        }
        for (i, arr) in [ids, items, ys, xlo, xhi].iter().enumerate() {
            table(MOBJ_TABLES + i as u16 * 0x10, None, arr);
        }

        let mut screen = [[0u8; 16]; 4];
        for s in 0..16u16 {
            let [lo, hi] = (0x6000 + s * 0x1B0).to_le_bytes();
            let [vlo, vhi] = (0x6000 + s * 0xF0).to_le_bytes();
            screen[0][s as usize] = lo;
            screen[1][s as usize] = hi;
            screen[2][s as usize] = vlo;
            screen[3][s as usize] = vhi;
        }
        table(SCREEN_LO, None, &screen[0]);
        table(SCREEN_HI, None, &screen[1]);
        table(VSCREEN_LO, None, &screen[2]);
        table(VSCREEN_HI, None, &screen[3]);

        // Palettes: every row byte is its own index.
        let pal_ptr = PALETTE_DATA.to_le_bytes();
        put(
            &mut prg,
            PALETTE_BANK,
            PALETTE_TABLE,
            &[pal_ptr[0], pal_ptr[1], pal_ptr[0], pal_ptr[1]],
        );
        symbols.insert("Palette_By_Tileset", PALETTE_TABLE);
        let palettes: Vec<u8> = (0..64u8).collect();
        put(&mut prg, PALETTE_BANK, PALETTE_DATA, &palettes);

        // World 1 map and links.
        put(&mut prg, MAP_BANK, 0xA000, &MAP_LAYOUT);
        symbols.insert("W1_Map_Layout", 0xA000);
        let mut map_table = |addr: u16, label: &str, bytes: &[u8]| {
            put(&mut prg, MAP_BANK, addr, bytes);
            symbols.insert(label, addr);
        };
        map_table(0xA100, "W1_ByRowType", &MAP_ROW_TYPE);
        map_table(0xA103, "W1_ByScrCol", &MAP_SCR_COL);
        map_table(0xA106, "W1_ObjSets", &[0x00, 0xC0, 0x01, 0xC0, 0x02, 0xC0]);
        map_table(0xA10C, "W1_LevelLayout", &[0x00, 0xA0, 0x10, 0xA0, 0x20, 0xA0]);

        let mut at = 0xA000 + LEVEL_BANK_OFFSET as u16;
        for (label, data) in &self.levels {
            put(&mut prg, LEVEL_BANK, at, data);
            symbols.insert(label, at);
            at += data.len() as u16;
        }
        let mut at = 0xC000;
        for (label, data) in &self.objects {
            put(&mut prg, OBJECT_BANK, at, data);
            symbols.insert(label, at);
            at += data.len() as u16;
        }

        for name in &self.removed {
            symbols.remove(name);
        }

        let mut image = Vec::with_capacity(16 + prg.len() + 8192);
        image.extend_from_slice(b"NES\x1A");
        image.extend_from_slice(&[(prg.len() / 16384) as u8, 1, 0x40, 0]);
        image.extend_from_slice(&[0; 8]);
        image.extend_from_slice(&prg);
        image.extend_from_slice(&[0; 8192]);

        BuiltCart {
            image,
            symbols,
            config: self.config,
        }
    }
}

impl BuiltCart {
    pub fn rom(&self) -> RomImage {
        RomImage::parse(&self.image).unwrap()
    }

    pub fn context(&self) -> EmulationContext {
        EmulationContext::new(self.rom(), self.symbols.clone(), self.config.clone()).unwrap()
    }
}

/// Copy `bytes` into `bank` as seen through the window containing `addr`.
fn put(prg: &mut [u8], bank: usize, addr: u16, bytes: &[u8]) {
    let start = bank * MMC3_BANKSIZE + (addr as usize % MMC3_BANKSIZE);
    assert!(start + bytes.len() <= (bank + 1) * MMC3_BANKSIZE, "bank {bank} overflow");
    prg[start..start + bytes.len()].copy_from_slice(bytes);
}
