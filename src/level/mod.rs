//! Decoded level model.
//!
//! A `Level` is rebuilt from scratch on every decode.  It holds the header,
//! the generator list in stream order, a copy of tile memory as the loader
//! left it, and a parallel grid recording which generator wrote each tile
//! last.  Objects and world-map links are plain tables read straight out of
//! the cartridge.

pub mod generator;
pub mod geometry;

pub use generator::{Generator, GeneratorKind, GeneratorList, PixelBounds};

// ─────────────────────────────────────────────────────────────────────────────
//  Tile memory layout
// ─────────────────────────────────────────────────────────────────────────────

/// Start of tile memory in expansion RAM.
pub const TILEMEM_BASE: u16 = 0x6000;
/// Last byte of tile memory.
pub const TILEMEM_END: u16 = 0x794F;
pub const TILEMEM_SIZE: usize = (TILEMEM_END - TILEMEM_BASE) as usize + 1;

/// Bytes per horizontal screen (16 × 27 tiles).
pub const SCREEN_BYTESIZE: u16 = 0x1B0;
/// Bytes per vertical screen (16 × 15 tiles).
pub const SCREEN_BYTESIZE_V: u16 = 0xF0;
/// Bytes per world-map screen (16 × 9 tiles).
pub const SCREEN_BYTESIZE_M: u16 = 0x90;
pub const SCREEN_WIDTH: u16 = 16;
pub const SCREEN_COUNT: u16 = 15;
pub const SCREEN_VCOUNT: u16 = 16;
pub const SCREEN_MCOUNT: u16 = 4;
/// Rows of unused space above the world-map tiles in each screen.
pub const SCREEN_MAP_ROW_OFFSET: usize = 17;
/// Tile edge in pixels.
pub const TILESIZE: u16 = 16;

// ─────────────────────────────────────────────────────────────────────────────
//  Record limits
// ─────────────────────────────────────────────────────────────────────────────

/// Parameter bytes a generator can carry.
pub const GEN_MAX_PARAMS: usize = 2;
pub const LEVEL_HEADER_COUNT: usize = 5;
/// Two alternate-level pointers plus the option bytes.
pub const LEVEL_HEADER_BYTES: usize = 4 + LEVEL_HEADER_COUNT;
pub const LEVEL_JCT_STARTS: usize = 16;
pub const OBJS_MAX: usize = 48;
pub const MOBJS_MAX: usize = 9;
/// Map object rows are stored with this many dead rows added.
pub const MAP_OBJECT_BASE_ROW: u8 = 2;
pub const MAX_MAP_LINKS: usize = 256;
pub const TILE_LAYOUT_COUNT: usize = 256;
pub const PALETTE_SIZE: usize = 16;
/// Sentinel in the tile owner grid for tiles no generator wrote.
pub const NO_OWNER: u16 = u16::MAX;

// ─────────────────────────────────────────────────────────────────────────────
//  Header
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelHeader {
    pub alt_level_layout: u16,
    pub alt_level_objects: u16,
    pub options: [u8; LEVEL_HEADER_COUNT],
    /// Filled from cartridge RAM after the load, not part of the header bytes.
    pub alt_level_tileset: u8,
    pub is_vert: bool,
    pub total_screens: u8,
    pub vert_scroll: u16,
}

impl LevelHeader {
    pub fn from_bytes(b: &[u8; LEVEL_HEADER_BYTES]) -> Self {
        let mut options = [0u8; LEVEL_HEADER_COUNT];
        options.copy_from_slice(&b[4..]);
        Self {
            alt_level_layout: u16::from_le_bytes([b[0], b[1]]),
            alt_level_objects: u16::from_le_bytes([b[2], b[3]]),
            options,
            ..Self::default()
        }
    }

    pub fn to_bytes(&self) -> [u8; LEVEL_HEADER_BYTES] {
        let mut b = [0u8; LEVEL_HEADER_BYTES];
        b[0..2].copy_from_slice(&self.alt_level_layout.to_le_bytes());
        b[2..4].copy_from_slice(&self.alt_level_objects.to_le_bytes());
        b[4..].copy_from_slice(&self.options);
        b
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Objects and links
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelObject {
    pub id: u8,
    pub col: u8,
    pub row: u8,
}

/// Edge from a world-map tile to a level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapLink {
    /// Row in the upper nibble, tileset in the lower.
    pub row_tileset: u8,
    /// Screen in the upper nibble, column in the lower.
    pub col_hi: u8,
    pub object_addr: u16,
    pub layout_addr: u16,
}

impl MapLink {
    /// Screen, then row, then column.
    pub fn sort_key(&self) -> u16 {
        (((self.col_hi & 0xF0) as u16) << 4)
            | (self.row_tileset & 0xF0) as u16
            | (self.col_hi & 0x0F) as u16
    }

    pub fn row(&self) -> u8 {
        self.row_tileset >> 4
    }

    pub fn tileset(&self) -> u8 {
        self.row_tileset & 0x0F
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Level
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Level {
    /// 0 is the world map.
    pub tileset: u8,
    pub header: LevelHeader,
    pub generators: GeneratorList,
    pub jct_y: [u8; LEVEL_JCT_STARTS],
    pub jct_x: [u8; LEVEL_JCT_STARTS],
    /// Tile memory as the loader left it.
    pub tiles: Vec<u8>,
    /// Sequence index of the last generator to write each tile.
    pub tile_owner: Vec<u16>,
    /// First generator byte, and one past the terminator.
    pub layout_start: u16,
    pub layout_end: u16,
    pub bg_pages: [u8; 2],
    /// Four 8×8 pattern numbers per 16×16 tile.
    pub tile_layout: Vec<[u8; 4]>,
    pub bg_palette: [u8; PALETTE_SIZE],
    pub spr_palette: [u8; PALETTE_SIZE],
    /// Leading byte of the object set, kept verbatim.
    pub object_unknown: u8,
    pub objects: Vec<LevelObject>,
    pub map_object_items: [u8; MOBJS_MAX],
    pub map_links: Vec<MapLink>,
}

impl Level {
    pub fn new(tileset: u8) -> Self {
        Self {
            tileset,
            header: LevelHeader::default(),
            generators: GeneratorList::new(),
            jct_y: [0xFF; LEVEL_JCT_STARTS],
            jct_x: [0xFF; LEVEL_JCT_STARTS],
            tiles: vec![0; TILEMEM_SIZE],
            tile_owner: vec![NO_OWNER; TILEMEM_SIZE],
            layout_start: 0,
            layout_end: 0,
            bg_pages: [0; 2],
            tile_layout: vec![[0; 4]; TILE_LAYOUT_COUNT],
            bg_palette: [0; PALETTE_SIZE],
            spr_palette: [0; PALETTE_SIZE],
            object_unknown: 0,
            objects: Vec::new(),
            map_object_items: [0; MOBJS_MAX],
            map_links: Vec::new(),
        }
    }

    pub fn is_world_map(&self) -> bool {
        self.tileset == 0
    }

    pub fn max_objects(&self) -> usize {
        if self.is_world_map() {
            MOBJS_MAX
        } else {
            OBJS_MAX
        }
    }

    pub fn tile(&self, addr: u16) -> Option<u8> {
        let i = tile_index(addr)?;
        self.tiles.get(i).copied()
    }

    pub fn owner(&self, addr: u16) -> Option<u16> {
        let i = tile_index(addr)?;
        self.tile_owner.get(i).copied().filter(|&o| o != NO_OWNER)
    }

    pub fn tile_address(&self, row: u16, col: u16) -> u16 {
        geometry::tile_address(row, col, self.header.is_vert)
    }

    /// List position of the generator drawn on top at pixel (x, y).
    pub fn generator_at(&self, x: u16, y: u16) -> Option<usize> {
        let addr = self.tile_address(y / TILESIZE, x / TILESIZE);
        let owner = self.owner(addr)?;
        self.generators.position_of(owner)
    }

    pub fn map_tile(&self, row: usize, col: usize) -> Option<u8> {
        self.tiles.get(geometry::map_tile_offset(row, col)).copied()
    }

    /// Returns the previous tile, or `None` if the position is off the map.
    pub fn set_map_tile(&mut self, row: usize, col: usize, tile: u8) -> Option<u8> {
        let cell = self.tiles.get_mut(geometry::map_tile_offset(row, col))?;
        Some(std::mem::replace(cell, tile))
    }

    /// Object set bytes: the leading byte, `id col row` triples, then 0xFF.
    pub fn encode_objects(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.objects.len() * 3);
        out.push(self.object_unknown);
        for o in &self.objects {
            out.extend_from_slice(&[o.id, o.col, o.row]);
        }
        out.push(0xFF);
        out
    }

    /// Objects must be ordered by column (row for vertical levels) for the
    /// game to spawn them.  World maps keep slot order.
    pub fn sort_objects(&mut self) {
        if self.is_world_map() {
            return;
        }
        if self.header.is_vert {
            self.objects.sort_by_key(|o| o.row);
        } else {
            self.objects.sort_by_key(|o| o.col);
        }
    }

    pub fn sort_map_links(&mut self) {
        self.map_links.sort_by_key(MapLink::sort_key);
    }
}

fn tile_index(addr: u16) -> Option<usize> {
    if (TILEMEM_BASE..=TILEMEM_END).contains(&addr) {
        Some((addr - TILEMEM_BASE) as usize)
    } else {
        None
    }
}
