//! Binary subtree blob writer for the `3DTILES_implicit_tiling` extension.
//!
//! The extension's reference format is a small binary container: a fixed
//! header, a JSON buffer/bufferView description, then the raw bitstream
//! bytes. This implementation's concrete header layout is documented as an
//! Open Question resolution in `DESIGN.md` -- byte-for-byte it is this
//! crate's own design, not a literal port, since no upstream C++ writer for
//! it exists in the source this crate was grounded on.

use crate::availability::SubtreeBits;

const MAGIC: &[u8; 4] = b"subt";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 24;

fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

/// Serialize one subtree's availability bitstreams into a self-contained blob.
pub fn write_subtree_blob(bits: &SubtreeBits) -> Vec<u8> {
    let node_bytes = bits.node_buffer_bytes();
    let child_bytes = bits.child_buffer_bytes();

    let mut binary = Vec::with_capacity(node_bytes.len() + child_bytes.len());
    binary.extend_from_slice(&node_bytes);
    let child_offset = binary.len();
    binary.extend_from_slice(&child_bytes);
    let binary_len_unpadded = binary.len();
    let padded_len = round_up(binary_len_unpadded, 8);
    binary.resize(padded_len, 0);

    let json = serde_json::json!({
        "buffers": [{ "byteLength": binary.len() }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": node_bytes.len() },
            { "buffer": 0, "byteOffset": child_offset, "byteLength": child_bytes.len() },
        ],
        "availability": {
            "tileAvailability": { "bufferView": 0 },
            "childSubtreeAvailability": { "bufferView": 1 },
        },
    });
    let mut json_bytes = json.to_string().into_bytes();
    let json_padded = round_up(json_bytes.len(), 8);
    json_bytes.resize(json_padded, b' ');

    let mut out = Vec::with_capacity(HEADER_LEN + json_bytes.len() + binary.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(json_bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(&(binary.len() as u64).to_le_bytes());
    out.extend_from_slice(&json_bytes);
    out.extend_from_slice(&binary);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::Availability;

    #[test]
    fn blob_starts_with_magic_and_version() {
        let mut avail = Availability::new(3);
        avail.mark_tile_available(2, 1, 1);
        let bits = avail.subtrees().next().unwrap().1;
        let blob = write_subtree_blob(bits);
        assert_eq!(&blob[0..4], b"subt");
        assert_eq!(u32::from_le_bytes(blob[4..8].try_into().unwrap()), 1);
    }

    #[test]
    fn blob_length_fields_match_actual_sections() {
        let mut avail = Availability::new(2);
        avail.mark_tile_available(1, 0, 1);
        let bits = avail.subtrees().next().unwrap().1;
        let blob = write_subtree_blob(bits);
        let json_len = u64::from_le_bytes(blob[8..16].try_into().unwrap()) as usize;
        let bin_len = u64::from_le_bytes(blob[16..24].try_into().unwrap()) as usize;
        assert_eq!(blob.len(), HEADER_LEN + json_len + bin_len);
    }

    #[test]
    fn blob_sections_are_eight_byte_aligned() {
        let mut avail = Availability::new(3);
        avail.mark_tile_available(2, 3, 3);
        let bits = avail.subtrees().next().unwrap().1;
        let blob = write_subtree_blob(bits);
        let json_len = u64::from_le_bytes(blob[8..16].try_into().unwrap()) as usize;
        let bin_len = u64::from_le_bytes(blob[16..24].try_into().unwrap()) as usize;
        assert_eq!(json_len % 8, 0);
        assert_eq!(bin_len % 8, 0);
    }

    #[test]
    fn embedded_json_describes_two_buffer_views() {
        let mut avail = Availability::new(2);
        avail.mark_tile_available(1, 0, 0);
        let bits = avail.subtrees().next().unwrap().1;
        let blob = write_subtree_blob(bits);
        let json_len = u64::from_le_bytes(blob[8..16].try_into().unwrap()) as usize;
        let json_str = std::str::from_utf8(&blob[24..24 + json_len]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(json_str.trim_end()).unwrap();
        assert_eq!(parsed["bufferViews"].as_array().unwrap().len(), 2);
    }
}
