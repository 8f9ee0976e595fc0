//! glTF/GLB payload construction for tile meshes.
//!
//! Mirrors the attribute-by-attribute buffer-view layout of a conventional
//! glTF exporter: one interleaved-free buffer, one bufferView/accessor pair
//! per attribute present on the mesh, one mesh/node/scene triple. Positions
//! are written from `Mesh::position_rtcs` (already relative to the tile
//! center) since CDB tile payloads are referenced to their own RTC_CENTER,
//! not to the glTF default origin.

use std::borrow::Cow;
use std::collections::BTreeMap;

use gltf::binary::Glb;
use gltf_json::accessor::{ComponentType, GenericComponentType, Type as AccessorType};
use gltf_json::buffer::Target;
use gltf_json::mesh::{Mode, Primitive, Semantic};
use gltf_json::validation::{Checked, USize64};
use gltf_json::Index;

use crate::types::mesh::PrimitiveMode;
use crate::types::Mesh;

/// A texture to bake into the glTF material, already encoded to an image
/// format (JPEG for shared CDB imagery, matching the upstream writer).
#[derive(Clone)]
pub struct GlbTexture {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

/// Serialize a [`Mesh`] into a self-contained binary glTF (GLB) buffer.
///
/// `texture` bakes a single unlit/lit base-color texture onto the mesh's
/// material when present; `unlit` selects `KHR_materials_unlit` (used when
/// the source config disables normal generation).
pub fn write_glb(mesh: &Mesh, texture: Option<&GlbTexture>, unlit: bool) -> Vec<u8> {
    if mesh.is_empty() {
        return write_empty_glb();
    }

    let mut root = gltf_json::Root {
        asset: gltf_json::Asset {
            version: "2.0".into(),
            generator: Some("cdb-to-3dtiles".into()),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut bin_data: Vec<u8> = Vec::new();
    let mut attributes = BTreeMap::new();
    let buffer_idx = Index::new(0);

    let positions: Vec<[f32; 3]> = mesh.position_rtcs.iter().map(|p| p.to_array()).collect();
    let (pos_min, pos_max) = compute_position_bounds(&positions);
    let pos_view = write_attribute_view(
        &mut root,
        &mut bin_data,
        buffer_idx,
        bytemuck::cast_slice(&positions),
    );
    let pos_accessor = root.push(gltf_json::Accessor {
        buffer_view: Some(pos_view),
        byte_offset: Some(USize64(0)),
        count: USize64::from(mesh.vertex_count()),
        component_type: Checked::Valid(GenericComponentType(ComponentType::F32)),
        type_: Checked::Valid(AccessorType::Vec3),
        min: Some(serde_json::json!(pos_min)),
        max: Some(serde_json::json!(pos_max)),
        name: None,
        normalized: false,
        sparse: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    attributes.insert(Checked::Valid(Semantic::Positions), pos_accessor);

    if mesh.has_normals() {
        let normals: Vec<[f32; 3]> = mesh.normals.iter().map(|n| n.to_array()).collect();
        let view = write_attribute_view(
            &mut root,
            &mut bin_data,
            buffer_idx,
            bytemuck::cast_slice(&normals),
        );
        let accessor = root.push(gltf_json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            count: USize64::from(mesh.vertex_count()),
            component_type: Checked::Valid(GenericComponentType(ComponentType::F32)),
            type_: Checked::Valid(AccessorType::Vec3),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        attributes.insert(Checked::Valid(Semantic::Normals), accessor);
    }

    if mesh.has_uvs() {
        let uvs: Vec<[f32; 2]> = mesh.uvs.iter().map(|uv| uv.to_array()).collect();
        let view = write_attribute_view(
            &mut root,
            &mut bin_data,
            buffer_idx,
            bytemuck::cast_slice(&uvs),
        );
        let accessor = root.push(gltf_json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            count: USize64::from(mesh.vertex_count()),
            component_type: Checked::Valid(GenericComponentType(ComponentType::F32)),
            type_: Checked::Valid(AccessorType::Vec2),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        attributes.insert(Checked::Valid(Semantic::TexCoords(0)), accessor);
    }

    let idx_accessor = if mesh.indices.is_empty() {
        None
    } else {
        let use_u16_indices = mesh.vertex_count() <= 65535;
        let idx_view =
            write_index_view(&mut root, &mut bin_data, buffer_idx, &mesh.indices, use_u16_indices);
        let idx_component_type = if use_u16_indices {
            ComponentType::U16
        } else {
            ComponentType::U32
        };
        Some(root.push(gltf_json::Accessor {
            buffer_view: Some(idx_view),
            byte_offset: Some(USize64(0)),
            count: USize64::from(mesh.indices.len()),
            component_type: Checked::Valid(GenericComponentType(idx_component_type)),
            type_: Checked::Valid(AccessorType::Scalar),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        }))
    };

    let texture_index = texture.map(|tex| write_texture(&mut root, &mut bin_data, buffer_idx, tex));
    let material_index = if texture_index.is_some() || unlit {
        Some(build_material(&mut root, texture_index, unlit))
    } else {
        None
    };

    let mode = match mesh.mode {
        PrimitiveMode::Points => Mode::Points,
        PrimitiveMode::Lines => Mode::Lines,
        PrimitiveMode::Triangles => Mode::Triangles,
    };
    let primitive = Primitive {
        attributes,
        indices: idx_accessor,
        material: material_index,
        mode: Checked::Valid(mode),
        targets: None,
        extensions: Default::default(),
        extras: Default::default(),
    };
    let mesh_idx = root.push(gltf_json::Mesh {
        primitives: vec![primitive],
        weights: None,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    let node_idx = root.push(gltf_json::Node {
        mesh: Some(mesh_idx),
        ..Default::default()
    });
    let scene_idx = root.push(gltf_json::Scene {
        nodes: vec![node_idx],
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    root.scene = Some(scene_idx);

    if unlit {
        root.extensions_used.push("KHR_materials_unlit".into());
    }

    while bin_data.len() % 4 != 0 {
        bin_data.push(0);
    }
    root.push(gltf_json::Buffer {
        byte_length: USize64::from(bin_data.len()),
        uri: None,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    assemble_glb(&root, bin_data)
}

fn write_attribute_view(
    root: &mut gltf_json::Root,
    bin_data: &mut Vec<u8>,
    buffer_idx: Index<gltf_json::Buffer>,
    raw_bytes: &[u8],
) -> Index<gltf_json::buffer::View> {
    while bin_data.len() % 4 != 0 {
        bin_data.push(0);
    }
    let byte_offset = bin_data.len();
    bin_data.extend_from_slice(raw_bytes);
    root.push(gltf_json::buffer::View {
        buffer: buffer_idx,
        byte_length: USize64::from(raw_bytes.len()),
        byte_offset: Some(USize64::from(byte_offset)),
        byte_stride: None,
        name: None,
        target: Some(Checked::Valid(Target::ArrayBuffer)),
        extensions: Default::default(),
        extras: Default::default(),
    })
}

fn write_index_view(
    root: &mut gltf_json::Root,
    bin_data: &mut Vec<u8>,
    buffer_idx: Index<gltf_json::Buffer>,
    indices: &[u32],
    use_u16: bool,
) -> Index<gltf_json::buffer::View> {
    while bin_data.len() % 4 != 0 {
        bin_data.push(0);
    }
    let byte_offset = bin_data.len();
    let byte_length = if use_u16 {
        let idx_u16: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
        bin_data.extend_from_slice(bytemuck::cast_slice(&idx_u16));
        indices.len() * 2
    } else {
        bin_data.extend_from_slice(bytemuck::cast_slice(indices));
        indices.len() * 4
    };
    root.push(gltf_json::buffer::View {
        buffer: buffer_idx,
        byte_length: USize64::from(byte_length),
        byte_offset: Some(USize64::from(byte_offset)),
        byte_stride: None,
        name: None,
        target: Some(Checked::Valid(Target::ElementArrayBuffer)),
        extensions: Default::default(),
        extras: Default::default(),
    })
}

fn write_texture(
    root: &mut gltf_json::Root,
    bin_data: &mut Vec<u8>,
    buffer_idx: Index<gltf_json::Buffer>,
    texture: &GlbTexture,
) -> Index<gltf_json::Texture> {
    while bin_data.len() % 4 != 0 {
        bin_data.push(0);
    }
    let byte_offset = bin_data.len();
    bin_data.extend_from_slice(&texture.data);
    let view = root.push(gltf_json::buffer::View {
        buffer: buffer_idx,
        byte_length: USize64::from(texture.data.len()),
        byte_offset: Some(USize64::from(byte_offset)),
        byte_stride: None,
        name: None,
        target: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    let image_idx = root.push(gltf_json::Image {
        buffer_view: Some(view),
        mime_type: Some(gltf_json::image::MimeType(texture.mime_type.to_string())),
        uri: None,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    let sampler_idx = root.push(gltf_json::texture::Sampler {
        mag_filter: Some(Checked::Valid(gltf_json::texture::MagFilter::Linear)),
        min_filter: Some(Checked::Valid(gltf_json::texture::MinFilter::LinearMipmapLinear)),
        wrap_s: Checked::Valid(gltf_json::texture::WrappingMode::ClampToEdge),
        wrap_t: Checked::Valid(gltf_json::texture::WrappingMode::ClampToEdge),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    root.push(gltf_json::Texture {
        sampler: Some(sampler_idx),
        source: image_idx,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    })
}

fn build_material(
    root: &mut gltf_json::Root,
    texture_index: Option<Index<gltf_json::Texture>>,
    unlit: bool,
) -> Index<gltf_json::Material> {
    let base_color_texture = texture_index.map(|idx| gltf_json::texture::Info {
        index: idx,
        tex_coord: 0,
        extensions: Default::default(),
        extras: Default::default(),
    });
    let pbr = gltf_json::material::PbrMetallicRoughness {
        base_color_factor: gltf_json::material::PbrBaseColorFactor([1.0, 1.0, 1.0, 1.0]),
        metallic_factor: gltf_json::material::StrengthFactor(0.0),
        roughness_factor: gltf_json::material::StrengthFactor(1.0),
        base_color_texture,
        metallic_roughness_texture: None,
        extensions: Default::default(),
        extras: Default::default(),
    };
    let mut extensions = gltf_json::extensions::material::Material::default();
    if unlit {
        extensions.unlit = Some(Default::default());
    }
    root.push(gltf_json::Material {
        pbr_metallic_roughness: pbr,
        alpha_mode: Checked::Valid(gltf_json::material::AlphaMode::Opaque),
        alpha_cutoff: None,
        double_sided: false,
        normal_texture: None,
        occlusion_texture: None,
        emissive_texture: None,
        emissive_factor: gltf_json::material::EmissiveFactor([0.0, 0.0, 0.0]),
        name: None,
        extensions: Some(extensions),
        extras: Default::default(),
    })
}

fn write_empty_glb() -> Vec<u8> {
    let mut root = gltf_json::Root {
        asset: gltf_json::Asset {
            version: "2.0".into(),
            generator: Some("cdb-to-3dtiles".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let node_idx = root.push(gltf_json::Node::default());
    let scene_idx = root.push(gltf_json::Scene {
        nodes: vec![node_idx],
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    root.scene = Some(scene_idx);
    assemble_glb(&root, Vec::new())
}

fn assemble_glb(root: &gltf_json::Root, bin_data: Vec<u8>) -> Vec<u8> {
    let json_string = gltf_json::serialize::to_string(root).expect("gltf-json serialization");
    let mut json_bytes = json_string.into_bytes();
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    let bin = if bin_data.is_empty() { None } else { Some(Cow::Owned(bin_data.clone())) };
    let length = 12 + 8 + json_bytes.len() + if bin_data.is_empty() { 0 } else { 8 + bin_data.len() };
    let glb = Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: length as u32,
        },
        json: Cow::Owned(json_bytes),
        bin,
    };
    glb.to_vec().expect("GLB serialization")
}

fn compute_position_bounds(positions: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for p in positions {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DVec3, Vec2, Vec3};

    fn triangle() -> Mesh {
        let mut mesh = Mesh {
            positions: vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![Vec3::Z, Vec3::Z, Vec3::Z],
            uvs: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        mesh.compute_rtc();
        mesh
    }

    #[test]
    fn glb_has_correct_magic_and_version() {
        let bytes = write_glb(&triangle(), None, false);
        assert_eq!(&bytes[0..4], b"glTF");
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(version, 2);
    }

    #[test]
    fn glb_roundtrips_through_gltf_crate() {
        let bytes = write_glb(&triangle(), None, false);
        let (doc, buffers, _images) = gltf::import_slice(&bytes).unwrap();
        let prim = doc.meshes().next().unwrap().primitives().next().unwrap();
        let reader = prim.reader(|b| Some(&buffers[b.index()]));
        assert_eq!(reader.read_positions().unwrap().count(), 3);
        assert_eq!(reader.read_indices().unwrap().into_u32().count(), 3);
    }

    #[test]
    fn empty_mesh_produces_valid_minimal_glb() {
        let bytes = write_glb(&Mesh::default(), None, false);
        assert_eq!(&bytes[0..4], b"glTF");
        let glb = Glb::from_slice(&bytes).unwrap();
        assert!(glb.bin.is_none());
    }

    #[test]
    fn textured_mesh_has_material_and_texture() {
        let tex = GlbTexture {
            data: vec![0u8; 16],
            mime_type: "image/jpeg",
        };
        let bytes = write_glb(&triangle(), Some(&tex), false);
        let (doc, _buffers, _images) = gltf::import_slice(&bytes).unwrap();
        assert_eq!(doc.textures().count(), 1);
        let mat = doc.materials().next().unwrap();
        assert!(mat.pbr_metallic_roughness().base_color_texture().is_some());
    }

    #[test]
    fn unlit_mesh_declares_extension() {
        let bytes = write_glb(&triangle(), None, true);
        let glb = Glb::from_slice(&bytes).unwrap();
        let json = std::str::from_utf8(&glb.json).unwrap();
        assert!(json.contains("KHR_materials_unlit"));
    }
}
