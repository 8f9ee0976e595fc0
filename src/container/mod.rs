//! Byte-exact tile container writers: `b3dm`, `i3dm`, `cmpt`.
//!
//! Each function packs a glTF payload (or, for `cmpt`, other containers)
//! behind a fixed little-endian header, padding every JSON section with
//! ASCII spaces and every binary section with zero bytes to an 8-byte
//! boundary, matching the upstream tile-format writer byte for byte.

pub mod glb;

pub use glb::{write_glb, GlbTexture};

fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

fn pad_spaces(s: &mut String, header_len: usize) {
    let target = round_up(header_len + s.len(), 8);
    s.push_str(&" ".repeat(target - header_len - s.len()));
}

fn pad_zeros(buf: &mut Vec<u8>, multiple: usize) {
    let target = round_up(buf.len(), multiple);
    buf.resize(target, 0);
}

/// An optional feature table (JSON text plus a raw binary block) attached to
/// a tile container.
#[derive(Default)]
pub struct FeatureTable {
    pub json: String,
    pub binary: Vec<u8>,
}

/// An optional batch table, same shape as [`FeatureTable`].
pub type BatchTable = FeatureTable;

const B3DM_HEADER_LEN: usize = 28;
const I3DM_HEADER_LEN: usize = 32;
const CMPT_HEADER_LEN: usize = 16;

/// Pack a GLB payload into a `b3dm` container.
pub fn write_b3dm(glb: &[u8], feature_table: &FeatureTable, batch_table: &BatchTable) -> Vec<u8> {
    let mut ft_json = feature_table.json.clone();
    pad_spaces(&mut ft_json, B3DM_HEADER_LEN);
    let mut ft_bin = feature_table.binary.clone();
    pad_zeros(&mut ft_bin, 8);

    let mut bt_json = batch_table.json.clone();
    pad_spaces(&mut bt_json, 0);
    let mut bt_bin = batch_table.binary.clone();
    pad_zeros(&mut bt_bin, 8);

    let mut glb_bytes = glb.to_vec();
    pad_zeros(&mut glb_bytes, 8);

    let byte_length = B3DM_HEADER_LEN + ft_json.len() + ft_bin.len() + bt_json.len() + bt_bin.len() + glb_bytes.len();

    let mut out = Vec::with_capacity(byte_length);
    out.extend_from_slice(b"b3dm");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(byte_length as u32).to_le_bytes());
    out.extend_from_slice(&(ft_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&(ft_bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&(bt_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&(bt_bin.len() as u32).to_le_bytes());
    out.extend_from_slice(ft_json.as_bytes());
    out.extend_from_slice(&ft_bin);
    out.extend_from_slice(bt_json.as_bytes());
    out.extend_from_slice(&bt_bin);
    out.extend_from_slice(&glb_bytes);
    out
}

/// Pack a GLB payload (or external glTF URI) into an `i3dm` container.
///
/// `gltf_payload` is either the raw GLB bytes (embedded) or a UTF-8 URI
/// string's bytes when referencing an external glTF; `embedded` selects
/// which the `gltfFormat` field declares (`1` = embedded GLB, `0` = URI).
pub fn write_i3dm(
    gltf_payload: &[u8],
    embedded: bool,
    feature_table: &FeatureTable,
    batch_table: &BatchTable,
) -> Vec<u8> {
    let mut ft_json = feature_table.json.clone();
    pad_spaces(&mut ft_json, I3DM_HEADER_LEN);
    let mut ft_bin = feature_table.binary.clone();
    pad_zeros(&mut ft_bin, 8);

    let mut bt_json = batch_table.json.clone();
    pad_spaces(&mut bt_json, 0);
    let mut bt_bin = batch_table.binary.clone();
    pad_zeros(&mut bt_bin, 8);

    let mut payload = gltf_payload.to_vec();
    pad_zeros(&mut payload, 8);

    let byte_length =
        I3DM_HEADER_LEN + ft_json.len() + ft_bin.len() + bt_json.len() + bt_bin.len() + payload.len();

    let mut out = Vec::with_capacity(byte_length);
    out.extend_from_slice(b"i3dm");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(byte_length as u32).to_le_bytes());
    out.extend_from_slice(&(ft_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&(ft_bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&(bt_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&(bt_bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&(embedded as u32).to_le_bytes());
    out.extend_from_slice(ft_json.as_bytes());
    out.extend_from_slice(&ft_bin);
    out.extend_from_slice(bt_json.as_bytes());
    out.extend_from_slice(&bt_bin);
    out.extend_from_slice(&payload);
    out
}

/// Concatenate already-written inner tile containers into a `cmpt`.
pub fn write_cmpt(inner_tiles: &[Vec<u8>]) -> Vec<u8> {
    let inner_len: usize = inner_tiles.iter().map(|t| t.len()).sum();
    let byte_length = CMPT_HEADER_LEN + inner_len;

    let mut out = Vec::with_capacity(byte_length);
    out.extend_from_slice(b"cmpt");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(byte_length as u32).to_le_bytes());
    out.extend_from_slice(&(inner_tiles.len() as u32).to_le_bytes());
    for tile in inner_tiles {
        out.extend_from_slice(tile);
    }
    out
}
