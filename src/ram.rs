// Cartridge RAM variables the codec reads or seeds, resolved by label.

use crate::error::CodecError;
use crate::nes::SymbolTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamVar {
    TempVar15,
    TempVar16,
    VertScrollHi,
    LevelWidth,
    LayPtrLo,
    LayPtrHi,
    MapTileAddrLo,
    MapTileAddrHi,
    VertScroll,
    Level7Vertical,
    TileAddrOff,
    ShapeDef,
    LevelTileset,
    PageC000,
    PageA000,
    WorldNum,
    PalSelTileColors,
    PalSelObjColors,
    MapObjectsItm,
    LevelAltTileset,
    LevelBgPage12,
    MapObjectsY,
    MapObjectsXLo,
    MapObjectsXHi,
    MapObjectsIds,
}

impl RamVar {
    pub const COUNT: usize = 25;

    pub const ALL: [RamVar; RamVar::COUNT] = [
        RamVar::TempVar15,
        RamVar::TempVar16,
        RamVar::VertScrollHi,
        RamVar::LevelWidth,
        RamVar::LayPtrLo,
        RamVar::LayPtrHi,
        RamVar::MapTileAddrLo,
        RamVar::MapTileAddrHi,
        RamVar::VertScroll,
        RamVar::Level7Vertical,
        RamVar::TileAddrOff,
        RamVar::ShapeDef,
        RamVar::LevelTileset,
        RamVar::PageC000,
        RamVar::PageA000,
        RamVar::WorldNum,
        RamVar::PalSelTileColors,
        RamVar::PalSelObjColors,
        RamVar::MapObjectsItm,
        RamVar::LevelAltTileset,
        RamVar::LevelBgPage12,
        RamVar::MapObjectsY,
        RamVar::MapObjectsXLo,
        RamVar::MapObjectsXHi,
        RamVar::MapObjectsIds,
    ];

    /// Label in the assembler listing.
    pub fn label(self) -> &'static str {
        match self {
            RamVar::TempVar15 => "Temp_Var15",
            RamVar::TempVar16 => "Temp_Var16",
            RamVar::VertScrollHi => "Vert_Scroll_Hi",
            RamVar::LevelWidth => "Level_Width",
            RamVar::LayPtrLo => "Level_LayPtr_AddrL",
            RamVar::LayPtrHi => "Level_LayPtr_AddrH",
            RamVar::MapTileAddrLo => "Map_Tile_AddrL",
            RamVar::MapTileAddrHi => "Map_Tile_AddrH",
            RamVar::VertScroll => "Vert_Scroll",
            RamVar::Level7Vertical => "Level_7Vertical",
            RamVar::TileAddrOff => "TileAddr_Off",
            RamVar::ShapeDef => "LL_ShapeDef",
            RamVar::LevelTileset => "Level_Tileset",
            RamVar::PageC000 => "PAGE_C000",
            RamVar::PageA000 => "PAGE_A000",
            RamVar::WorldNum => "World_Num",
            RamVar::PalSelTileColors => "PalSel_Tile_Colors",
            RamVar::PalSelObjColors => "PalSel_Obj_Colors",
            RamVar::MapObjectsItm => "Map_Objects_Itm",
            RamVar::LevelAltTileset => "Level_AltTileset",
            RamVar::LevelBgPage12 => "Level_BG_Page1_2",
            RamVar::MapObjectsY => "Map_Objects_Y",
            RamVar::MapObjectsXLo => "Map_Objects_XLo",
            RamVar::MapObjectsXHi => "Map_Objects_XHi",
            RamVar::MapObjectsIds => "Map_Objects_IDs",
        }
    }
}

/// Resolved addresses for every `RamVar`.
#[derive(Debug, Clone)]
pub struct RamMap {
    addrs: [u16; RamVar::COUNT],
}

impl RamMap {
    pub fn resolve(symbols: &SymbolTable) -> Result<Self, CodecError> {
        let mut addrs = [0u16; RamVar::COUNT];
        for var in RamVar::ALL {
            addrs[var as usize] = symbols.require(var.label())?;
        }
        Ok(Self { addrs })
    }

    pub fn addr(&self, var: RamVar) -> u16 {
        self.addrs[var as usize]
    }

    /// Address of element `i` of an array variable.
    pub fn index(&self, var: RamVar, i: usize) -> u16 {
        self.addr(var).wrapping_add(i as u16)
    }
}
