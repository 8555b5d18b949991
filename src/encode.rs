// Level model → generator bytecode.
//
// Every record opens with two position bytes (`Temp_Var15`, `Temp_Var16` in
// the loader) and a shape byte (`LL_ShapeDef`):
//
//   junction   111x iiii | y        | x
//   variable   ddd? rrrr | ssss cccc | hhhh pppp  [extra params]
//   fixed      iii? rrrr | ssss cccc | 0000 iiii
//
// A zero top nibble in the shape byte is the only thing that tells a fixed
// record from a variable one, so variable ids are stored as
// `id / 15` in the position byte and `id % 15 + 1` in the shape nibble.

use crate::error::CodecError;
use crate::level::geometry::split_tile_address;
use crate::level::{Generator, GeneratorKind, Level, GEN_MAX_PARAMS};
use crate::stop::StopReason;

pub const STREAM_TERMINATOR: u8 = 0xFF;
const JUNCTION_MARKER: u8 = 0xE0;

/// Largest id each kind can express.  Ids whose group bits come out as
/// `111` would read back as a junction marker.
pub const VARIABLE_ID_MAX: u8 = 7 * 15 - 1;
pub const FIXED_ID_MAX: u8 = 0x6F;
pub const JUNCTION_ID_MAX: u8 = 0x0F;

/// Serialise the generator list, terminated, optionally preceded by the
/// 9 header bytes.
pub fn encode(level: &Level, include_header: bool) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(level.generators.byte_size() + 10);
    if include_header {
        out.extend_from_slice(&level.header.to_bytes());
    }
    for (pos, gen) in level.generators.iter().enumerate() {
        encode_generator(gen, level.header.is_vert, &mut out)
            .map_err(|e| e.context(&format!("generator {pos}")))?;
    }
    out.push(STREAM_TERMINATOR);
    Ok(out)
}

/// Append one record to `out`.  Nothing is appended on error.
pub fn encode_generator(
    gen: &Generator,
    vertical: bool,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    match gen.kind {
        GeneratorKind::JunctionStart => {
            if gen.id > JUNCTION_ID_MAX {
                log::warn!("Junction id {} does not fit, truncating", gen.id);
            }
            out.extend_from_slice(&[
                JUNCTION_MARKER | (gen.id & 0x0F),
                gen.params[0],
                gen.params[1],
            ]);
        }
        GeneratorKind::Variable => {
            if gen.byte_size as usize >= 3 + GEN_MAX_PARAMS {
                return Err(CodecError::with_detail(
                    StopReason::GeneratorTooLarge,
                    format!("variable id {} is {} bytes", gen.id, gen.byte_size),
                ));
            }
            if gen.id > VARIABLE_ID_MAX {
                log::warn!("Variable generator id {} does not fit, truncating", gen.id);
            }
            let (mut t15, t16) = split_tile_address(gen.address_start, vertical);
            t15 |= ((gen.id / 15) & 0x07) << 5;
            out.extend_from_slice(&[t15, t16, shape_byte(gen)]);
            for i in 3..gen.byte_size as usize {
                out.push(gen.params[i - 2]);
            }
        }
        GeneratorKind::Fixed => {
            if gen.id > FIXED_ID_MAX {
                log::warn!("Fixed generator id {} does not fit, truncating", gen.id);
            }
            let (mut t15, t16) = split_tile_address(gen.address_start, vertical);
            t15 |= (gen.id & 0x70) << 1;
            out.extend_from_slice(&[t15, t16, shape_byte(gen)]);
        }
    }
    Ok(())
}

/// Third byte of a record.
pub fn shape_byte(gen: &Generator) -> u8 {
    match gen.kind {
        GeneratorKind::JunctionStart => gen.params[1],
        GeneratorKind::Variable => ((gen.id % 15 + 1) & 0x0F) << 4 | (gen.params[0] & 0x0F),
        GeneratorKind::Fixed => gen.id & 0x0F,
    }
}
