use std::path::Path;
use std::process::ExitCode;

use nodice::{
    CodecError, Config, DecodeTarget, Editor, EmulationContext, GeneratorKind, Level, StopReason,
};

const USAGE: &str = "usage:
  nodice <config.json> level <tileset> <layout-label> <object-label>
  nodice <config.json> map <world>
  nodice <config.json> verify <tileset> <layout-label> <object-label>";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let [config_path, command, rest @ ..] = args else {
        return Err(USAGE.to_string());
    };
    let config = Config::load(Path::new(config_path))?;
    let ctx = EmulationContext::open(config).map_err(|e| e.to_string())?;
    let mut editor = Editor::new(ctx);

    match (command.as_str(), rest) {
        ("level", [tileset, layout, objects]) => {
            let tileset = parse_tileset(tileset)?;
            editor
                .load_level(tileset, layout, objects)
                .map_err(|e| e.to_string())?;
            print_level(editor.level());
            Ok(())
        }
        ("map", [world]) => {
            let world = world
                .parse::<u8>()
                .ok()
                .and_then(|w| w.checked_sub(1))
                .ok_or_else(|| format!("Invalid world number {world}"))?;
            editor
                .load(DecodeTarget::WorldMap { world })
                .map_err(|e| e.to_string())?;
            print_level(editor.level());
            Ok(())
        }
        ("verify", [tileset, layout, objects]) => {
            let tileset = parse_tileset(tileset)?;
            editor
                .load_level(tileset, layout, objects)
                .map_err(|e| e.to_string())?;
            verify(editor).map_err(|e| e.to_string())
        }
        _ => Err(USAGE.to_string()),
    }
}

fn parse_tileset(s: &str) -> Result<u8, String> {
    s.parse::<u8>()
        .ok()
        .filter(|&t| t > 0)
        .ok_or_else(|| format!("Invalid tileset {s}"))
}

/// Encode the loaded level, run it back through the loader and compare.
fn verify(editor: Editor) -> Result<(), CodecError> {
    let level = editor.level().clone();
    let mut ctx = editor.into_context();
    let reloaded = ctx.reload(&level, None, true)?;
    let stored = level.layout_end.wrapping_sub(level.layout_start) as usize;
    let encoded = level.generators.byte_size() + 1;

    if reloaded.generators.same_encoding(&level.generators) && reloaded.tiles == level.tiles {
        println!(
            "OK: {} generators, {} bytes (stored {})",
            level.generators.len(),
            encoded,
            stored
        );
        Ok(())
    } else {
        Err(CodecError::with_detail(
            StopReason::GeneratorCountMismatch,
            format!(
                "round trip differs: {} generators decoded, {} after reload",
                level.generators.len(),
                reloaded.generators.len()
            ),
        ))
    }
}

fn print_level(level: &Level) {
    let h = &level.header;
    if level.is_world_map() {
        println!("World map: {} screens", h.total_screens);
    } else {
        println!(
            "Tileset {}: {} screens{}, layout ${:04X}-${:04X}",
            level.tileset,
            h.total_screens,
            if h.is_vert { " (vertical)" } else { "" },
            level.layout_start,
            level.layout_end
        );
        println!(
            "  alternate: tileset {} layout ${:04X} objects ${:04X}",
            h.alt_level_tileset, h.alt_level_layout, h.alt_level_objects
        );
        println!("  options: {:02X?}", h.options);
    }

    if !level.generators.is_empty() {
        println!("Generators:");
    }
    for (pos, g) in level.generators.iter().enumerate() {
        let kind = match g.kind {
            GeneratorKind::JunctionStart => "junction",
            GeneratorKind::Variable => "variable",
            GeneratorKind::Fixed => "fixed",
        };
        match g.row_col() {
            Some((row, col)) => println!(
                "  {pos:3}: {kind:8} id {:3} at row {row:3} col {col:3}  params {:02X?}  {} bytes",
                g.id, g.params, g.byte_size
            ),
            None => println!(
                "  {pos:3}: {kind:8} id {:3}  params {:02X?}  {} bytes",
                g.id, g.params, g.byte_size
            ),
        }
    }

    if !level.objects.is_empty() {
        println!("Objects:");
    }
    for o in &level.objects {
        println!("  id ${:02X} col {:3} row {:3}", o.id, o.col, o.row);
    }

    if !level.map_links.is_empty() {
        println!("Links:");
    }
    for l in &level.map_links {
        println!(
            "  row {:2} tileset {:2} col ${:02X}: layout ${:04X} objects ${:04X}",
            l.row(),
            l.tileset(),
            l.col_hi,
            l.layout_addr,
            l.object_addr
        );
    }
}
