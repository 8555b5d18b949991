// Tile memory layout: addresses ↔ rows, columns and pixels.
//
// Horizontal levels are screen-major: each screen is 16 columns wide and
// SCREEN_BYTESIZE bytes long, screens follow each other in memory.
// Vertical levels are plain 16-column row-major memory.

use super::{
    SCREEN_BYTESIZE, SCREEN_BYTESIZE_V, SCREEN_MAP_ROW_OFFSET, SCREEN_WIDTH, TILEMEM_BASE,
    TILESIZE,
};

/// Top-left pixel of the tile at `addr` (absolute tile-memory address).
pub fn tile_pixel(addr: u16, vertical: bool) -> (u16, u16) {
    let off = addr.wrapping_sub(TILEMEM_BASE);
    if vertical {
        ((off & 0x0F) * TILESIZE, (off / SCREEN_WIDTH) * TILESIZE)
    } else {
        let col = (off / SCREEN_BYTESIZE) * SCREEN_WIDTH + off % SCREEN_WIDTH;
        let row = (off % SCREEN_BYTESIZE) / SCREEN_WIDTH;
        (col * TILESIZE, row * TILESIZE)
    }
}

/// Absolute tile-memory address of a (row, column) position.
pub fn tile_address(row: u16, col: u16, vertical: bool) -> u16 {
    let off = if vertical {
        row * SCREEN_WIDTH + col
    } else {
        (col / SCREEN_WIDTH) * SCREEN_BYTESIZE + row * SCREEN_WIDTH + col % SCREEN_WIDTH
    };
    TILEMEM_BASE.wrapping_add(off)
}

/// Split a tile address into the two position bytes of a generator record.
///
/// The first byte holds the row within the screen in its low nibble and,
/// for horizontal levels, a flag (bit 4) for the lower part of the screen
/// past offset $100.  The second byte holds the screen number in its high
/// nibble and the column in its low nibble.  The top three bits of the first
/// byte are left clear for the caller.
pub fn split_tile_address(addr: u16, vertical: bool) -> (u8, u8) {
    let off = addr.wrapping_sub(TILEMEM_BASE);
    let stride = if vertical { SCREEN_BYTESIZE_V } else { SCREEN_BYTESIZE };
    let screen = off / stride;
    let inner = off % stride;

    let mut row_byte = ((inner >> 4) & 0x0F) as u8;
    if !vertical && inner >= 0x100 {
        row_byte |= 0x10;
    }
    let screen_col = (((screen & 0x0F) << 4) | (inner & 0x0F)) as u8;
    (row_byte, screen_col)
}

/// Inverse of `split_tile_address`, the way the loader computes it.
pub fn join_tile_address(row_byte: u8, screen_col: u8, vertical: bool) -> u16 {
    let screen = (screen_col >> 4) as u16;
    let mut addr = TILEMEM_BASE
        + screen * if vertical { SCREEN_BYTESIZE_V } else { SCREEN_BYTESIZE };
    if !vertical && row_byte & 0x10 != 0 {
        addr += 0x100;
    }
    addr + (((row_byte & 0x0F) as u16) << 4) + (screen_col & 0x0F) as u16
}

/// Offset into the tile grid of a world-map tile.  Map rows start
/// SCREEN_MAP_ROW_OFFSET rows into each screen.
pub fn map_tile_offset(row: usize, col: usize) -> usize {
    let width = SCREEN_WIDTH as usize;
    SCREEN_MAP_ROW_OFFSET * width
        + (col / width) * SCREEN_BYTESIZE as usize
        + row * width
        + col % width
}
