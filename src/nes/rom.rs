// iNES cartridge image parser with CHR decoding.

use std::path::Path;

use super::mmc3::MMC3_BANKSIZE;

pub const INES_MAGIC: &[u8; 4] = b"NES\x1A";
pub const INES_HEADER_SIZE: usize = 16;
pub const PRG_PAGE_SIZE: usize = 16384;
pub const CHR_PAGE_SIZE: usize = 8192;

/// 1 KB MMC3 CHR bank = 64 tiles.
pub const CHR_TILES_PER_BANK: usize = 64;
/// One decoded 8×8 tile at 8 bpp.
pub const CHR_TILE_BYTES: usize = 64;
pub const CHR_BANK_BYTES: usize = CHR_TILES_PER_BANK * CHR_TILE_BYTES;

/// A loaded cartridge: raw PRG plus CHR decoded to one byte per pixel.
#[derive(Debug, Clone)]
pub struct RomImage {
    pub prg: Vec<u8>,
    /// Number of 1 KB CHR banks.
    pub chr_banks: usize,
    chr: Vec<u8>,
    /// MD5 of the whole file, for log lines and sanity checks.
    pub md5: String,
}

impl RomImage {
    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read(path)
            .map_err(|e| format!("Failed to open binary {}: {e}", path.display()))?;
        Self::parse(&data).map_err(|e| format!("{}: {e}", path.display()))
    }

    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let (prg_size, chr_size) = read_header(data)?;

        let prg_end = INES_HEADER_SIZE + prg_size;
        let chr_end = prg_end + chr_size;
        if data.len() < chr_end {
            return Err(format!(
                "File truncated: header declares {} bytes, file has {}",
                chr_end,
                data.len()
            ));
        }

        let chr_banks = chr_size / 1024;
        let rom = Self {
            prg: data[INES_HEADER_SIZE..prg_end].to_vec(),
            chr_banks,
            chr: decode_chr(&data[prg_end..chr_end]),
            md5: format!("{:x}", md5::compute(data)),
        };

        log::info!(
            "ROM: {} KB PRG, {} CHR banks, md5 {}",
            rom.prg.len() / 1024,
            rom.chr_banks,
            rom.md5
        );
        Ok(rom)
    }

    pub fn prg_banks(&self) -> usize {
        self.prg.len() / MMC3_BANKSIZE
    }

    /// One decoded 1 KB CHR bank (64 tiles × 64 pixels).  Out-of-range bank
    /// numbers wrap the way the mapper would.
    pub fn chr_bank(&self, bank: u8) -> &[u8] {
        if self.chr_banks == 0 {
            return &[];
        }
        let bank = bank as usize % self.chr_banks;
        &self.chr[bank * CHR_BANK_BYTES..(bank + 1) * CHR_BANK_BYTES]
    }

    /// Replace PRG with a freshly assembled image.  CHR is left alone, and
    /// the PRG size must not change underneath loaded levels.
    pub fn refresh_prg(&mut self, data: &[u8]) -> Result<(), String> {
        let (prg_size, _) = read_header(data)?;
        if prg_size != self.prg.len() {
            return Err(format!(
                "PRG changed size ({} -> {} bytes); reopen the cartridge instead",
                self.prg.len(),
                prg_size
            ));
        }
        let prg_end = INES_HEADER_SIZE + prg_size;
        if data.len() < prg_end {
            return Err("File truncated inside PRG".to_string());
        }
        self.prg.copy_from_slice(&data[INES_HEADER_SIZE..prg_end]);
        self.md5 = format!("{:x}", md5::compute(data));
        log::info!("ROM: PRG refreshed, md5 {}", self.md5);
        Ok(())
    }

    /// Bytes still unused (0xFF) at the end of a PRG bank.  The last 0xFF
    /// before the free run is taken to be the terminator of the bank's final
    /// level, so it is not counted.
    pub fn bank_free_space(&self, bank: u8) -> usize {
        let banks = self.prg_banks().max(1);
        let start = (bank as usize % banks) * MMC3_BANKSIZE;
        let Some(data) = self.prg.get(start..start + MMC3_BANKSIZE) else {
            return 0;
        };
        match data.iter().rposition(|&b| b != 0xFF) {
            Some(last_used) => MMC3_BANKSIZE.saturating_sub(last_used + 2),
            None => MMC3_BANKSIZE - 1,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Returns (PRG size, CHR size) in bytes.
fn read_header(data: &[u8]) -> Result<(usize, usize), String> {
    if data.len() < INES_HEADER_SIZE || &data[0..4] != INES_MAGIC {
        return Err("Not a valid iNES image".to_string());
    }
    let prg_size = data[4] as usize * PRG_PAGE_SIZE;
    let chr_size = data[5] as usize * CHR_PAGE_SIZE;
    if prg_size == 0 {
        return Err("iNES header declares no PRG".to_string());
    }
    Ok((prg_size, chr_size))
}

/// Convert planar 2 bpp tiles (16 bytes each) to linear 8 bpp.
fn decode_chr(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 4);
    for tile in raw.chunks_exact(16) {
        for row in 0..8 {
            let lo = tile[row];
            let hi = tile[row + 8];
            for bit in (0..8).rev() {
                out.push(((lo >> bit) & 1) | (((hi >> bit) & 1) << 1));
            }
        }
    }
    out
}
