//! End-to-end coverage for the concrete scenarios enumerated in spec §8:
//! literal byte buffers through a decoder, across the registry and edit
//! pipeline, and out an exporter, rather than unit-level checks of a single
//! function. Mirrors the teacher's `tests/roundtrip.rs` convention of
//! building real bytes and reading them back through the public API.

use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::HashSet;

use pcloud_core::cloud::CanonicalCloud;
use pcloud_core::reconstruct::{reconstruct, CancelToken};
use pcloud_core::registry::{CloudEntry, Registry};
use pcloud_core::{decode, editing, export};

/// Scenario 1: LAS 1.2 point format 2, 8 points on a grid along X, RGB
/// alternating black/red.
#[test]
fn las_grid_decodes_with_expected_positions_and_color() {
    const HEADER_SIZE: u16 = 227;
    const RECORD_LENGTH: u16 = 26;
    let offset_to_point_data = HEADER_SIZE as u32;

    let mut header = vec![0u8; HEADER_SIZE as usize];
    header[0..4].copy_from_slice(b"LASF");
    header[24] = 1;
    header[25] = 2;
    (&mut header[94..96]).write_u16::<LittleEndian>(HEADER_SIZE).unwrap();
    (&mut header[96..100]).write_u32::<LittleEndian>(offset_to_point_data).unwrap();
    header[104] = 2; // point data format 2 (RGB at byte 20)
    (&mut header[105..107]).write_u16::<LittleEndian>(RECORD_LENGTH).unwrap();
    (&mut header[107..111]).write_u32::<LittleEndian>(8).unwrap();

    (&mut header[131..139]).write_f64::<LittleEndian>(1.0).unwrap(); // scale x
    (&mut header[139..147]).write_f64::<LittleEndian>(1.0).unwrap(); // scale y
    (&mut header[147..155]).write_f64::<LittleEndian>(1.0).unwrap(); // scale z
    (&mut header[179..187]).write_f64::<LittleEndian>(7.0).unwrap(); // max x
    (&mut header[187..195]).write_f64::<LittleEndian>(0.0).unwrap(); // min x
    (&mut header[195..203]).write_f64::<LittleEndian>(0.0).unwrap(); // max y
    (&mut header[203..211]).write_f64::<LittleEndian>(0.0).unwrap(); // min y
    (&mut header[211..219]).write_f64::<LittleEndian>(0.0).unwrap(); // max z
    (&mut header[219..227]).write_f64::<LittleEndian>(0.0).unwrap(); // min z

    let mut bytes = header;
    for x in 0..8u32 {
        let mut record = vec![0u8; RECORD_LENGTH as usize];
        (&mut record[0..4]).write_i32::<LittleEndian>(x as i32).unwrap();
        let (r, g, b) = if x == 0 { (0u16, 0u16, 0u16) } else { (255u16, 0u16, 0u16) };
        (&mut record[20..22]).write_u16::<LittleEndian>(r).unwrap();
        (&mut record[22..24]).write_u16::<LittleEndian>(g).unwrap();
        (&mut record[24..26]).write_u16::<LittleEndian>(b).unwrap();
        bytes.extend_from_slice(&record);
    }

    let cloud = decode::decode_by_extension("las", &bytes).unwrap();
    assert_eq!(cloud.point_count(), 8);
    assert!(cloud.has_color);
    assert!(cloud.check_invariants());

    let mut xs: Vec<f32> = cloud.positions.chunks_exact(3).map(|c| c[0]).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!((xs[0] - (-3.5)).abs() < 1e-4);
    assert!((xs[7] - 3.5).abs() < 1e-4);

    assert_eq!(&cloud.colors[0..3], &[0.0, 0.0, 0.0]);
}

/// Scenario 2: PLY ASCII, 3 vertices, no color.
#[test]
fn ply_ascii_triangle_centers_and_converts_to_yup() {
    let text = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n1 0 0\n0 1 0\n";
    let cloud = decode::decode_by_extension("ply", text.as_bytes()).unwrap();
    assert_eq!(cloud.point_count(), 3);
    assert!(!cloud.has_color);
    for c in cloud.colors.chunks_exact(3) {
        assert_eq!(c, &[0.8, 0.8, 0.8]);
    }

    // AABB of (0,0,0),(1,0,0),(0,1,0) is min=(0,0,0), max=(1,1,0), so the
    // decoder centers on the midpoint (0.5,0.5,0), not the point centroid.
    let expected = [
        -0.5, 0.0, 0.5, //
        0.5, 0.0, 0.5, //
        -0.5, 0.0, -0.5,
    ];
    for (got, want) in cloud.positions.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-5, "{got} vs {want}");
    }
}

/// Scenario 3: PCD `binary_compressed`, 1 vertex with packed RGB red.
#[test]
fn pcd_binary_compressed_single_red_point() {
    let header = "# .PCD v0.7\nVERSION 0.7\nFIELDS x y z rgb\nSIZE 4 4 4 4\nTYPE F F F F\nCOUNT 1 1 1 1\nWIDTH 1\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 1\nDATA binary_compressed\n";

    // Column-major raw data for one point: x, y, z, then packed rgb (as if a
    // raw u32 reinterpreted as f32 bits, per spec's 0xAARRGGBB packing).
    let packed_rgb = 0x00ff0000u32; // pure red
    let mut raw = Vec::new();
    raw.extend_from_slice(&1.0f32.to_le_bytes());
    raw.extend_from_slice(&2.0f32.to_le_bytes());
    raw.extend_from_slice(&3.0f32.to_le_bytes());
    raw.extend_from_slice(&f32::from_bits(packed_rgb).to_le_bytes());

    let compressed = lzf::compress(&raw).expect("lzf compress");

    let mut bytes = header.as_bytes().to_vec();
    bytes.write_u32::<LittleEndian>(compressed.len() as u32).unwrap();
    bytes.write_u32::<LittleEndian>(raw.len() as u32).unwrap();
    bytes.extend_from_slice(&compressed);

    let cloud = decode::decode_by_extension("pcd", &bytes).unwrap();
    assert_eq!(cloud.point_count(), 1);
    assert!(cloud.has_color);
    assert!((cloud.colors[0] - 1.0).abs() < 1e-3);
    assert!(cloud.colors[1].abs() < 1e-3);
    assert!(cloud.colors[2].abs() < 1e-3);
    // Centered on its own single point.
    assert!(cloud.positions[0].abs() < 1e-5);
    assert!(cloud.positions[1].abs() < 1e-5);
    assert!(cloud.positions[2].abs() < 1e-5);
}

/// Scenario 4: STL binary, one triangle, vertex dedup to 3 unique points.
#[test]
fn stl_binary_one_triangle_dedupes_to_three_vertices() {
    let mut bytes = vec![0u8; 80];
    bytes.write_u32::<LittleEndian>(1).unwrap();
    for v in [0.0f32, 0.0, 0.0] {
        bytes.write_f32::<LittleEndian>(v).unwrap(); // normal, ignored
    }
    let verts = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    for v in verts {
        for c in v {
            bytes.write_f32::<LittleEndian>(c).unwrap();
        }
    }
    bytes.write_u16::<LittleEndian>(0).unwrap();

    let cloud = decode::decode_by_extension("stl", &bytes).unwrap();
    assert_eq!(cloud.point_count(), 3);
    assert!(!cloud.has_color);
    let indices = cloud.indices.unwrap();
    assert_eq!(indices, vec![0, 1, 2]);
}

/// Scenario 5: thinning a synthetic 1000-point cloud to 25%, then to 25%
/// again, through the registry/edit pipeline.
#[test]
fn thin_through_registry_hits_exact_counts() {
    let mut positions = Vec::with_capacity(1000 * 3);
    for i in 0..1000 {
        positions.extend_from_slice(&[i as f32, 0.0, 0.0]);
    }
    let cloud = CanonicalCloud {
        colors: vec![0.8; 1000 * 3],
        intensities: vec![0.0; 1000],
        classifications: vec![0.0; 1000],
        positions,
        indices: None,
        header: Default::default(),
        center: glam::DVec3::ZERO,
        has_color: false,
        has_intensity: false,
        has_classification: false,
    };
    let mut registry = Registry::new();
    let mut entry = CloudEntry::new("c".into(), "c".into(), "c".into(), &cloud);
    registry.put("c", cloud);

    editing::thin(&mut registry, &mut entry, 25.0);
    assert_eq!(registry.get("c").unwrap().point_count(), 250);
    assert!(registry.get("c").unwrap().check_invariants());

    editing::thin(&mut registry, &mut entry, 25.0);
    assert_eq!(registry.get("c").unwrap().point_count(), 63);
    assert_eq!(entry.transform_version, 2);
}

/// Scenario 6: reconstructing a planar 10x10 grid yields a non-empty,
/// duplicate-free, locally-bounded triangulation.
#[test]
fn reconstruct_planar_grid_yields_bounded_triangles() {
    let mut positions = Vec::new();
    for x in 0..10 {
        for z in 0..10 {
            positions.extend_from_slice(&[x as f32, 0.0, z as f32]);
        }
    }
    let config = pcloud_core::config::ReconstructConfig {
        k_neighbors: 15,
        max_edge_length: Some(2.0),
    };
    let cancel = CancelToken::new();
    let indices = reconstruct(&positions, config, &cancel, |_| {}).unwrap();
    assert!(!indices.is_empty());

    let mut seen = HashSet::new();
    for tri in indices.chunks_exact(3) {
        let mut key = *tri;
        key.sort_unstable();
        assert!(seen.insert(key), "duplicate triangle {key:?}");

        let p = |i: u32| {
            let i = i as usize;
            glam::Vec3::new(positions[i * 3], positions[i * 3 + 1], positions[i * 3 + 2])
        };
        let (a, b, c) = (p(tri[0]), p(tri[1]), p(tri[2]));
        assert!((a - b).length() <= 2.0 + 1e-4);
        assert!((b - c).length() <= 2.0 + 1e-4);
        assert!((a - c).length() <= 2.0 + 1e-4);
    }
}

/// Export-then-decode of a PLY-binary round trip preserves point count and
/// positions, and a full decode -> edit -> export -> decode pipeline sees
/// the edit reflected.
#[test]
fn decode_edit_export_decode_pipeline_preserves_edits() {
    let text = "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n0 0 0 255 0 0\n1 0 0 0 255 0\n";
    let cloud = decode::decode_by_extension("ply", text.as_bytes()).unwrap();
    assert_eq!(cloud.point_count(), 2);

    let mut registry = Registry::new();
    let mut entry = CloudEntry::new("c".into(), "c".into(), "c".into(), &cloud);
    registry.put("c", cloud);

    editing::translate(&mut registry, &mut entry, glam::Vec3::new(10.0, 0.0, 0.0));
    assert_eq!(entry.transform_version, 1);

    let translated = registry.get("c").unwrap();
    let bytes = export::ply::encode_binary(translated);
    let reloaded = decode::decode_by_extension("ply", &bytes).unwrap();

    assert_eq!(reloaded.point_count(), translated.point_count());
    for (a, b) in translated.positions.iter().zip(reloaded.positions.iter()) {
        assert!((a - b).abs() < 1e-4);
    }
}
