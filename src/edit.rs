//! Edit/reload loop.
//!
//! Generator edits are never trusted on their own.  Each one is applied to a
//! copy of the current level, re-encoded, staged in the scratch window and
//! decoded again by the cartridge's loader under a watchdog.  Only a clean
//! reload that yields the expected number of generators replaces the
//! current level; otherwise the previous level stays untouched and the
//! error is returned.
//!
//! Objects, map tiles and map links are static tables, so their edits are
//! applied directly.

use std::collections::VecDeque;
use std::time::Duration;

use crate::decode::{DecodeTarget, EmulationContext};
use crate::encode::encode;
use crate::error::CodecError;
use crate::level::{
    Generator, GeneratorKind, Level, LevelHeader, LevelObject, MapLink, GEN_MAX_PARAMS,
    MAP_OBJECT_BASE_ROW, MAX_MAP_LINKS, SCREEN_BYTESIZE, SCREEN_BYTESIZE_V, SCREEN_COUNT,
    SCREEN_WIDTH, TILESIZE,
};
use crate::nes::bus::SCRATCH_START;
use crate::stop::{StopReason, Watchdog};

// ─────────────────────────────────────────────────────────────────────────────
//  Reload
// ─────────────────────────────────────────────────────────────────────────────

impl EmulationContext {
    /// Run bytecode for `current`'s tileset back through the loader.
    ///
    /// With `data == None` the current level is re-encoded (header
    /// included).  Payload-only data (`has_header == false`) gets the
    /// current header prepended.  Objects are carried over from `current`
    /// since they are not part of the stream.
    pub fn reload(
        &mut self,
        current: &Level,
        data: Option<&[u8]>,
        has_header: bool,
    ) -> Result<Level, CodecError> {
        if current.is_world_map() {
            return Err(CodecError::init("world maps have no generator stream"));
        }

        let bytes = match data {
            None => encode(current, true)?,
            Some(d) if has_header => d.to_vec(),
            Some(d) => {
                let mut v = current.header.to_bytes().to_vec();
                v.extend_from_slice(d);
                v
            }
        };
        self.bus_mut()
            .load_scratch(&bytes)
            .map_err(CodecError::init)?;

        let mut level = self.decode(DecodeTarget::Level {
            tileset: current.tileset,
            layout: SCRATCH_START,
            objects: None,
        })?;
        level.object_unknown = current.object_unknown;
        level.objects = current.objects.clone();
        Ok(level)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Undo history
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum UndoEntry {
    /// Encoded generator stream, re-decoded on undo.
    Generators { data: Vec<u8>, has_header: bool },
    Objects(Vec<LevelObject>),
    MapTile { row: usize, col: usize, tile: u8 },
    Links(Vec<MapLink>),
    /// Whole level, for loads that switch to another layout.
    Level(Box<Level>),
}

// ─────────────────────────────────────────────────────────────────────────────
//  Editor
// ─────────────────────────────────────────────────────────────────────────────

/// Mutating operations return `Ok(true)` when the level changed and
/// `Ok(false)` when the request was a no-op (already at the front, position
/// out of range, target off the grid).
pub struct Editor {
    ctx: EmulationContext,
    level: Level,
    undo: VecDeque<UndoEntry>,
}

impl Editor {
    /// Starts with an empty level; call `load` or `load_level` next.
    pub fn new(ctx: EmulationContext) -> Self {
        Self {
            ctx,
            level: Level::new(1),
            undo: VecDeque::new(),
        }
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn context(&self) -> &EmulationContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut EmulationContext {
        &mut self.ctx
    }

    pub fn into_context(self) -> EmulationContext {
        self.ctx
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Decode a new level; the undo history is dropped on success.
    pub fn load(&mut self, target: DecodeTarget) -> Result<(), CodecError> {
        let level = self.guarded(|ctx| ctx.decode(target))?;
        self.replace_level(level);
        Ok(())
    }

    pub fn load_level(
        &mut self,
        tileset: u8,
        layout_label: &str,
        object_label: &str,
    ) -> Result<(), CodecError> {
        let level = self.guarded(|ctx| ctx.load_level(tileset, layout_label, object_label))?;
        self.replace_level(level);
        Ok(())
    }

    fn replace_level(&mut self, level: Level) {
        log::info!(
            "Loaded tileset {} with {} generators, {} objects",
            level.tileset,
            level.generators.len(),
            level.objects.len()
        );
        self.level = level;
        self.undo.clear();
    }

    /// Switch to the alternate layout the header points at.  Undo returns
    /// to the current level.
    pub fn open_alternate(&mut self) -> Result<(), CodecError> {
        let h = &self.level.header;
        let target = DecodeTarget::Level {
            tileset: h.alt_level_tileset,
            layout: h.alt_level_layout,
            objects: Some(h.alt_level_objects),
        };
        let level = self
            .guarded(|ctx| ctx.decode(target))
            .map_err(|e| e.context("alternate level"))?;
        let previous = std::mem::replace(&mut self.level, level);
        self.push_undo(UndoEntry::Level(Box::new(previous)));
        Ok(())
    }

    // ── Generators ───────────────────────────────────────────────────────

    pub fn remove_generator(&mut self, pos: usize) -> Result<bool, CodecError> {
        let mut staged = self.level.clone();
        if staged.generators.remove(pos).is_none() {
            return Ok(false);
        }
        self.commit(staged, false)
    }

    /// Move a generator by whole tiles.  Each axis is applied only if the
    /// target stays on the grid; horizontal levels step across screen
    /// boundaries.
    pub fn translate_generator(
        &mut self,
        pos: usize,
        diff_row: i32,
        diff_col: i32,
    ) -> Result<bool, CodecError> {
        let mut staged = self.level.clone();
        let vertical = staged.header.is_vert;
        let Some(gen) = staged.generators.get_mut(pos) else {
            return Ok(false);
        };
        if gen.kind == GeneratorKind::JunctionStart || gen.bounds.is_empty() {
            return Ok(false);
        }

        let cur_row = (gen.bounds.ys / TILESIZE) as i32;
        let cur_col = (gen.bounds.xs / TILESIZE) as i32;
        let target_row = cur_row + diff_row;
        let target_col = cur_col + diff_col;
        let width = SCREEN_WIDTH as i32;
        let mut addr = gen.address_start as i32;

        if vertical {
            let rows = (SCREEN_BYTESIZE_V as i32 / width) * SCREEN_COUNT as i32;
            if (0..rows).contains(&target_row) {
                addr += diff_row * width;
            }
            if (0..width).contains(&target_col) {
                addr += diff_col;
            }
        } else {
            if (0..SCREEN_BYTESIZE as i32 / width).contains(&target_row) {
                addr += diff_row * width;
            }
            let target_screen = target_col.div_euclid(width);
            if (0..=SCREEN_COUNT as i32).contains(&target_screen) {
                let screen_diff = target_screen - cur_col / width;
                addr += if screen_diff != 0 {
                    SCREEN_BYTESIZE as i32 * screen_diff - screen_diff * width + diff_col
                } else {
                    diff_col
                };
            }
        }

        let addr = addr as u16;
        if addr == gen.address_start {
            return Ok(false);
        }
        gen.address_start = addr;
        self.commit(staged, false)
    }

    /// One step toward the head of the list (drawn earlier).
    pub fn send_backward(&mut self, pos: usize) -> Result<bool, CodecError> {
        if pos == 0 || pos >= self.level.generators.len() {
            return Ok(false);
        }
        self.reorder(pos, pos.checked_sub(2))
    }

    /// One step toward the tail (drawn later).
    pub fn bring_forward(&mut self, pos: usize) -> Result<bool, CodecError> {
        if pos + 1 >= self.level.generators.len() {
            return Ok(false);
        }
        self.reorder(pos, Some(pos))
    }

    pub fn send_to_back(&mut self, pos: usize) -> Result<bool, CodecError> {
        if pos == 0 || pos >= self.level.generators.len() {
            return Ok(false);
        }
        self.reorder(pos, None)
    }

    pub fn bring_to_front(&mut self, pos: usize) -> Result<bool, CodecError> {
        let len = self.level.generators.len();
        if pos + 1 >= len {
            return Ok(false);
        }
        self.reorder(pos, Some(len - 2))
    }

    /// Remove at `pos`, then reinsert after `after` (positions counted once
    /// the generator is out of the list).
    fn reorder(&mut self, pos: usize, after: Option<usize>) -> Result<bool, CodecError> {
        let mut staged = self.level.clone();
        let Some(gen) = staged.generators.remove(pos) else {
            return Ok(false);
        };
        staged.generators.insert_after(after, gen);
        self.commit(staged, false)
    }

    /// Append a new generator at (row, col).  Junctions take their Y/X
    /// coordinate bytes from `params` instead of a position.
    pub fn insert_generator(
        &mut self,
        kind: GeneratorKind,
        id: u8,
        row: u16,
        col: u16,
        params: &[u8],
    ) -> Result<bool, CodecError> {
        let mut staged = self.level.clone();
        let addr = staged.tile_address(row, col);
        let gen = match kind {
            GeneratorKind::JunctionStart => {
                let p = |i: usize| params.get(i).copied().unwrap_or(0);
                Generator::junction(id, p(0), p(1))
            }
            GeneratorKind::Variable => Generator::variable(id, addr, params),
            GeneratorKind::Fixed => Generator::fixed(id, addr),
        };
        staged.generators.push(gen);
        self.commit(staged, false)
    }

    pub fn set_generator_params(
        &mut self,
        pos: usize,
        params: [u8; GEN_MAX_PARAMS],
    ) -> Result<bool, CodecError> {
        let mut staged = self.level.clone();
        let Some(gen) = staged.generators.get_mut(pos) else {
            return Ok(false);
        };
        gen.params = params;
        self.commit(staged, false)
    }

    /// Replace the stored header bytes (alternate pointers and options).
    pub fn change_header(&mut self, header: &LevelHeader) -> Result<bool, CodecError> {
        let mut staged = self.level.clone();
        staged.header.alt_level_layout = header.alt_level_layout;
        staged.header.alt_level_objects = header.alt_level_objects;
        staged.header.options = header.options;
        self.commit(staged, true)
    }

    /// Reload `staged` and make it current if the loader agrees with it.
    fn commit(&mut self, staged: Level, with_header: bool) -> Result<bool, CodecError> {
        let snapshot = UndoEntry::Generators {
            data: encode(&self.level, with_header)?,
            has_header: with_header,
        };
        let expected = staged.generators.len();
        let reloaded = self.guarded(|ctx| ctx.reload(&staged, None, true))?;
        if reloaded.generators.len() != expected {
            log::warn!(
                "Reload produced {} generators, expected {}",
                reloaded.generators.len(),
                expected
            );
            return Err(CodecError::with_detail(
                StopReason::GeneratorCountMismatch,
                format!("expected {expected}, loader produced {}", reloaded.generators.len()),
            ));
        }
        self.push_undo(snapshot);
        self.level = reloaded;
        Ok(true)
    }

    // ── Objects ──────────────────────────────────────────────────────────

    pub fn insert_object(&mut self, id: u8, row: u8, col: u8) -> bool {
        if self.level.objects.len() >= self.level.max_objects() {
            return false;
        }
        self.mark_objects();
        self.level.objects.push(LevelObject { id, col, row });
        self.level.sort_objects();
        true
    }

    pub fn remove_object(&mut self, index: usize) -> bool {
        if index >= self.level.objects.len() {
            return false;
        }
        self.mark_objects();
        self.level.objects.remove(index);
        true
    }

    pub fn translate_object(&mut self, index: usize, diff_row: i32, diff_col: i32) -> bool {
        let Some(obj) = self.level.objects.get(index) else {
            return false;
        };
        let (Some(row), Some(col)) = (
            shifted(obj.row, diff_row),
            shifted(obj.col, diff_col),
        ) else {
            return false;
        };
        self.mark_objects();
        let obj = &mut self.level.objects[index];
        obj.row = row;
        obj.col = col;
        self.level.sort_objects();
        true
    }

    /// World-map object slots are fixed; clearing parks the slot above the
    /// map.
    pub fn clear_map_object(&mut self, index: usize) -> bool {
        if !self.level.is_world_map() || index >= self.level.objects.len() {
            return false;
        }
        self.mark_objects();
        self.level.objects[index] = LevelObject {
            id: 0,
            col: 0,
            row: 0u8.wrapping_sub(MAP_OBJECT_BASE_ROW),
        };
        true
    }

    fn mark_objects(&mut self) {
        let objects = self.level.objects.clone();
        self.push_undo(UndoEntry::Objects(objects));
    }

    // ── World map ────────────────────────────────────────────────────────

    pub fn map_tile(&self, row: usize, col: usize) -> Option<u8> {
        self.level.map_tile(row, col)
    }

    pub fn set_map_tile(&mut self, row: usize, col: usize, tile: u8) -> bool {
        if !self.level.is_world_map() {
            return false;
        }
        match self.level.set_map_tile(row, col, tile) {
            Some(old) => {
                self.push_undo(UndoEntry::MapTile { row, col, tile: old });
                true
            }
            None => false,
        }
    }

    /// New link with zero addresses at (row, col); fill it in with
    /// `update_link`.
    pub fn insert_link(&mut self, row: u8, col: u8) -> bool {
        if !self.level.is_world_map() || self.level.map_links.len() >= MAX_MAP_LINKS {
            return false;
        }
        self.mark_links();
        self.level.map_links.push(MapLink {
            row_tileset: row.wrapping_add(MAP_OBJECT_BASE_ROW) << 4,
            col_hi: col,
            ..MapLink::default()
        });
        self.level.sort_map_links();
        true
    }

    pub fn remove_link(&mut self, index: usize) -> bool {
        if index >= self.level.map_links.len() {
            return false;
        }
        self.mark_links();
        self.level.map_links.remove(index);
        true
    }

    pub fn translate_link(&mut self, index: usize, diff_row: i32, diff_col: i32) -> bool {
        let Some(link) = self.level.map_links.get(index) else {
            return false;
        };
        let target_row = link.row() as i32 + diff_row;
        let Some(col) = shifted(link.col_hi, diff_col) else {
            return false;
        };
        // Row shares its byte with the tileset nibble.
        if !(0..=0x0F).contains(&target_row) {
            return false;
        }
        self.mark_links();
        let link = &mut self.level.map_links[index];
        link.row_tileset = (link.row_tileset & 0x0F) | ((target_row as u8) << 4);
        link.col_hi = col;
        self.level.sort_map_links();
        true
    }

    pub fn update_link(&mut self, index: usize, link: MapLink) -> bool {
        if index >= self.level.map_links.len() {
            return false;
        }
        self.mark_links();
        self.level.map_links[index] = link;
        self.level.sort_map_links();
        true
    }

    fn mark_links(&mut self) {
        let links = self.level.map_links.clone();
        self.push_undo(UndoEntry::Links(links));
    }

    // ── Undo ─────────────────────────────────────────────────────────────

    /// Revert the most recent edit.  Returns `Ok(false)` with nothing to
    /// undo.  If a generator snapshot no longer reloads, it stays on the
    /// history and the error is returned.
    pub fn undo(&mut self) -> Result<bool, CodecError> {
        let Some(entry) = self.undo.pop_back() else {
            return Ok(false);
        };
        match entry {
            UndoEntry::Generators { data, has_header } => {
                let current = self.level.clone();
                match self.guarded(|ctx| ctx.reload(&current, Some(&data), has_header)) {
                    Ok(level) => self.level = level,
                    Err(e) => {
                        self.undo.push_back(UndoEntry::Generators { data, has_header });
                        return Err(e.context("undo"));
                    }
                }
            }
            UndoEntry::Objects(objects) => self.level.objects = objects,
            UndoEntry::MapTile { row, col, tile } => {
                self.level.set_map_tile(row, col, tile);
            }
            UndoEntry::Links(links) => self.level.map_links = links,
            UndoEntry::Level(level) => self.level = *level,
        }
        Ok(true)
    }

    fn push_undo(&mut self, entry: UndoEntry) {
        self.undo.push_back(entry);
        while self.undo.len() > self.ctx.config().undo_limit {
            self.undo.pop_front();
        }
    }

    /// Run an emulation under the configured watchdog.
    fn guarded<T>(
        &mut self,
        op: impl FnOnce(&mut EmulationContext) -> Result<T, CodecError>,
    ) -> Result<T, CodecError> {
        let timeout = Duration::from_millis(self.ctx.config().core_timeout_ms);
        let watchdog = Watchdog::arm(self.ctx.stop_signal(), timeout);
        let result = op(&mut self.ctx);
        watchdog.disarm();
        result
    }
}

/// `value + diff` if it stays within a byte.
fn shifted(value: u8, diff: i32) -> Option<u8> {
    u8::try_from(value as i32 + diff).ok()
}
