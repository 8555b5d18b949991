// Generator records and the ordered list that owns them.

use super::GEN_MAX_PARAMS;

/// Which loader routine handled a generator.  Fixed for the life of the
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    /// Level entry/exit coordinate; writes no tiles.
    JunctionStart,
    /// Size-parameterised structure (shape byte top nibble != 0).
    Variable,
    /// Fixed-size structure (shape byte top nibble == 0).
    Fixed,
}

/// Pixel-space bounding box, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub xs: u16,
    pub ys: u16,
    pub xe: u16,
    pub ye: u16,
}

impl PixelBounds {
    pub const EMPTY: PixelBounds = PixelBounds {
        xs: u16::MAX,
        ys: u16::MAX,
        xe: 0,
        ye: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.xs > self.xe || self.ys > self.ye
    }

    /// Grow to include the tile whose top-left pixel is (x, y).
    pub fn extend(&mut self, x: u16, y: u16) {
        self.xs = self.xs.min(x);
        self.ys = self.ys.min(y);
        self.xe = self.xe.max(x);
        self.ye = self.ye.max(y);
    }

    /// Push the far edges out to cover whole tiles.
    pub fn pad(&mut self, tile: u16) {
        self.xe = self.xe.saturating_add(tile - 1);
        self.ye = self.ye.saturating_add(tile - 1);
    }

    pub fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.xs && x <= self.xe && y >= self.ys && y <= self.ye
    }
}

impl Default for PixelBounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    pub kind: GeneratorKind,
    pub id: u8,
    /// First tile address the loader computed for this generator.
    pub address_start: u16,
    /// Observed write range in expansion RAM.
    pub address_min: u16,
    pub address_max: u16,
    pub bounds: PixelBounds,
    pub params: [u8; GEN_MAX_PARAMS],
    /// Bytes this generator occupies in the level stream.
    pub byte_size: u16,
    /// Position in the list at decode time; also stamped into the tile
    /// owner grid.
    pub sequence_index: u16,
}

impl Generator {
    pub fn new(kind: GeneratorKind, id: u8) -> Self {
        Self {
            kind,
            id,
            address_start: 0,
            address_min: u16::MAX,
            address_max: 0,
            bounds: PixelBounds::EMPTY,
            params: [0; GEN_MAX_PARAMS],
            byte_size: 3,
            sequence_index: 0,
        }
    }

    /// A variable generator takes two header bytes plus one byte per
    /// parameter; the first parameter shares the shape byte.
    pub fn variable(id: u8, address: u16, params: &[u8]) -> Self {
        let mut g = Self::new(GeneratorKind::Variable, id);
        g.address_start = address;
        let n = params.len().min(GEN_MAX_PARAMS);
        g.params[..n].copy_from_slice(&params[..n]);
        g.byte_size = 2 + n.max(1) as u16;
        g
    }

    pub fn fixed(id: u8, address: u16) -> Self {
        let mut g = Self::new(GeneratorKind::Fixed, id);
        g.address_start = address;
        g
    }

    /// `y` and `x` are the raw junction coordinate bytes.
    pub fn junction(id: u8, y: u8, x: u8) -> Self {
        let mut g = Self::new(GeneratorKind::JunctionStart, id);
        g.params = [y, x];
        g
    }

    /// Same record as far as the bytecode is concerned.
    pub fn same_encoding(&self, other: &Generator) -> bool {
        self.kind == other.kind
            && self.id == other.id
            && self.params == other.params
            && self.address_start == other.address_start
    }

    pub fn row_col(&self) -> Option<(u16, u16)> {
        if self.bounds.is_empty() {
            return None;
        }
        Some((self.bounds.ys / super::TILESIZE, self.bounds.xs / super::TILESIZE))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Ordered list
// ─────────────────────────────────────────────────────────────────────────────

/// Generators in stream order.
///
/// Records live in an arena and the order is a separate index list, so
/// reordering never moves the records themselves.  The only structural
/// mutations are `insert_after` and `remove`; slots freed by `remove` are
/// reused by the next insert.
#[derive(Debug, Clone, Default)]
pub struct GeneratorList {
    slots: Vec<Option<Generator>>,
    order: Vec<usize>,
    free: Vec<usize>,
}

impl GeneratorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&Generator> {
        let slot = *self.order.get(pos)?;
        self.slots[slot].as_ref()
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut Generator> {
        let slot = *self.order.get(pos)?;
        self.slots[slot].as_mut()
    }

    pub fn last(&self) -> Option<&Generator> {
        self.len().checked_sub(1).and_then(|p| self.get(p))
    }

    pub fn last_mut(&mut self) -> Option<&mut Generator> {
        self.len().checked_sub(1).and_then(|p| self.get_mut(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Generator> + '_ {
        self.order.iter().filter_map(|&s| self.slots[s].as_ref())
    }

    /// Append to the tail.  Returns the new position.
    pub fn push(&mut self, gen: Generator) -> usize {
        self.insert_after(self.len().checked_sub(1), gen)
    }

    /// Insert after position `pos`, or at the head for `None`.  Positions
    /// past the end append.  Returns the new generator's position.
    pub fn insert_after(&mut self, pos: Option<usize>, gen: Generator) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(gen);
                slot
            }
            None => {
                self.slots.push(Some(gen));
                self.slots.len() - 1
            }
        };
        let at = match pos {
            Some(p) => (p + 1).min(self.order.len()),
            None => 0,
        };
        self.order.insert(at, slot);
        at
    }

    pub fn remove(&mut self, pos: usize) -> Option<Generator> {
        if pos >= self.order.len() {
            return None;
        }
        let slot = self.order.remove(pos);
        self.free.push(slot);
        self.slots[slot].take()
    }

    /// Sum of stream bytes over all generators (terminator excluded).
    pub fn byte_size(&self) -> usize {
        self.iter().map(|g| g.byte_size as usize).sum()
    }

    /// Position of the generator stamped with `sequence_index`.
    pub fn position_of(&self, sequence_index: u16) -> Option<usize> {
        self.iter().position(|g| g.sequence_index == sequence_index)
    }

    /// Same kinds, ids, parameters, start addresses and order.
    pub fn same_encoding(&self, other: &GeneratorList) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.same_encoding(b))
    }
}

impl FromIterator<Generator> for GeneratorList {
    fn from_iter<I: IntoIterator<Item = Generator>>(iter: I) -> Self {
        let mut list = GeneratorList::new();
        for g in iter {
            list.push(g);
        }
        list
    }
}
