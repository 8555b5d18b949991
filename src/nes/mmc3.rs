//! MMC3 PRG banking: maps the CPU's $8000-$FFFF range onto 8 KB banks of
//! the PRG image.
//!
//! The range is split into four windows.  $8000 and $E000 are fixed to the
//! second-to-last and last banks; $A000 and $C000 are repointed by writing a
//! command byte to the command register and then a bank number to the page
//! register.  CHR banking is not modelled since the codec never renders.

pub const MMC3_BANKSIZE: usize = 8192;

pub const MMC3_COMMAND: u16 = 0x8000;
pub const MMC3_PAGE: u16 = 0x8001;
/// Command/page registers repeat (even/odd) through this address.
pub const MMC3_REG_END: u16 = 0x9FFF;

/// Bank-select commands the loader uses (PRG mode bit set).
pub const MMC3_CMD_PAGE_C000: u8 = 0x46;
pub const MMC3_CMD_PAGE_A000: u8 = 0x47;
/// Commands below this are CHR selects.
const MMC3_CMD_CHR_END: u8 = 0x46;
const MMC3_CMD_PRG_MODE: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrgWindow {
    /// $8000-$9FFF, fixed.
    A,
    /// $A000-$BFFF, swappable.
    B,
    /// $C000-$DFFF, swappable.
    C,
    /// $E000-$FFFF, fixed.
    D,
}

impl PrgWindow {
    fn for_addr(addr: u16) -> Option<Self> {
        match addr {
            0x8000..=0x9FFF => Some(PrgWindow::A),
            0xA000..=0xBFFF => Some(PrgWindow::B),
            0xC000..=0xDFFF => Some(PrgWindow::C),
            0xE000..=0xFFFF => Some(PrgWindow::D),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
pub struct Mmc3 {
    bank_count: usize,
    /// Latched command, cleared after each page write.
    command: u8,
    /// Bank number currently mapped into each window.
    banks: [usize; 4],
}

impl Mmc3 {
    pub fn new(prg_len: usize) -> Self {
        let mut mmc3 = Self {
            bank_count: (prg_len / MMC3_BANKSIZE).max(2),
            command: 0,
            banks: [0; 4],
        };
        mmc3.reset();
        mmc3
    }

    /// Power-on mapping: fixed windows on the last two banks, $A000 on
    /// bank 0 and $C000 on bank 1.
    pub fn reset(&mut self) {
        self.command = 0;
        self.banks = [self.bank_count - 2, 0, 1, self.bank_count - 1];
    }

    pub fn write_command(&mut self, value: u8) {
        self.command = value;
    }

    pub fn write_page(&mut self, value: u8) {
        match self.command {
            MMC3_CMD_PAGE_C000 => self.select(PrgWindow::C, value),
            MMC3_CMD_PAGE_A000 => self.select(PrgWindow::B, value),
            c if c >= MMC3_CMD_PRG_MODE && c < MMC3_CMD_CHR_END => {}
            c => log::warn!("MMC3: unsupported command ${c:02X} (page ${value:02X})"),
        }
        self.command = 0;
    }

    /// Point a swappable window at `bank`.  Fixed windows cannot be moved.
    fn select(&mut self, window: PrgWindow, bank: u8) {
        if matches!(window, PrgWindow::A | PrgWindow::D) {
            log::warn!("MMC3: attempt to switch fixed window {window:?}");
            return;
        }
        let mut bank = bank as usize;
        if bank >= self.bank_count {
            log::warn!("MMC3: bank {bank} beyond {} banks, wrapping", self.bank_count);
            bank %= self.bank_count;
        }
        self.banks[window.slot()] = bank;
    }

    #[cfg(test)]
    fn bank(&self, window: PrgWindow) -> usize {
        self.banks[window.slot()]
    }

    /// PRG byte offset backing a CPU address in $8000-$FFFF.
    pub fn prg_offset(&self, addr: u16) -> Option<usize> {
        let window = PrgWindow::for_addr(addr)?;
        Some(self.banks[window.slot()] * MMC3_BANKSIZE + (addr as usize & (MMC3_BANKSIZE - 1)))
    }
}
