// Editor configuration: where the cartridge lives, emulation limits and the
// bank numbers used for direct (non-emulated) reads.
// Stored as JSON; missing fields fall back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::level::TILEMEM_END;
use crate::nes::bus::MEM_B_END;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path stem of the assembled cartridge: `<filebase>.nes` and `<filebase>.fns`.
    pub filebase: String,
    /// Watchdog budget for one emulated load, in milliseconds.
    pub core_timeout_ms: u64,
    /// Writes in `TILEMEM_END+1 ..= level_range_check_high` abort a level load.
    pub level_range_check_high: u16,
    /// Bank holding level object sets (mapped at $C000).
    pub object_bank: u8,
    /// Bank holding world map layouts and link tables (mapped at $A000).
    pub map_layout_bank: u8,
    /// Bank holding tileset palettes (mapped at $A000).
    pub palette_bank: u8,
    /// Zero-based world whose map carries no map objects.
    pub warpzone_world: Option<u8>,
    /// Number of edits kept for undo.
    pub undo_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filebase: "smb3".to_string(),
            core_timeout_ms: 5000,
            level_range_check_high: MEM_B_END,
            object_bank: 6,
            map_layout_bank: 12,
            palette_bank: 27,
            warpzone_world: Some(8),
            undo_limit: 100,
        }
    }
}

impl Config {
    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config {}: {e}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse config from a JSON string. Unknown fields are ignored,
    /// missing fields get defaults.
    pub fn from_json(s: &str) -> Result<Self, String> {
        let mut config: Config =
            serde_json::from_str(s).map_err(|e| format!("Invalid config: {e}"))?;
        config.sanitize();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, json)
            .map_err(|e| format!("Cannot save config {}: {e}", path.display()))?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn rom_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.nes", self.filebase))
    }

    pub fn symbols_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.fns", self.filebase))
    }

    /// The high-water mark only makes sense inside the expansion RAM window
    /// above the tile grid.
    fn sanitize(&mut self) {
        let clamped = self.level_range_check_high.clamp(TILEMEM_END, MEM_B_END);
        if clamped != self.level_range_check_high {
            log::warn!(
                "level_range_check_high ${:04X} out of range, using ${:04X}",
                self.level_range_check_high,
                clamped
            );
            self.level_range_check_high = clamped;
        }
        if self.undo_limit == 0 {
            self.undo_limit = 1;
        }
    }
}
