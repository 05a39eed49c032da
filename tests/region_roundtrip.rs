//! Region store integration tests: full-chunk round trips across store
//! instances and tolerance of torn files left by a crash.

use terravox::persistence::RegionStore;
use terravox::{Chunk64, ChunkDelta, FaceChunkKey, MaterialId};

fn terrain_chunk() -> Chunk64 {
    // Rock below y = 32, air above, plus a dirt column at (20, _, 20)
    let mut chunk = Chunk64::new();
    for z in 0..Chunk64::N {
        for y in 0..Chunk64::N {
            for x in 0..Chunk64::N {
                let mat = if y < 32 {
                    MaterialId::ROCK
                } else {
                    MaterialId::AIR
                };
                chunk.set_voxel(x, y, z, mat);
            }
        }
    }
    for y in 0..40 {
        chunk.set_voxel(20, y, 20, MaterialId::DIRT);
    }
    chunk
}

#[test]
fn chunk_roundtrip_across_store_instances() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("regions");
    let key = FaceChunkKey::new(0, 3, -5, 11);

    let chunk = terrain_chunk();
    {
        let store = RegionStore::new(&root);
        assert!(store.save_chunk(&key, &chunk));
    }

    // Fresh store handle, as after a restart
    let store = RegionStore::new(&root);
    assert!(store.region_path(&key).exists());

    let mut loaded = Chunk64::new();
    assert!(store.load_chunk(&key, &mut loaded));

    let mut mismatches = 0u32;
    for z in 0..Chunk64::N {
        for y in 0..Chunk64::N {
            for x in 0..Chunk64::N {
                if loaded.get_material(x, y, z) != chunk.get_material(x, y, z)
                    || loaded.is_solid(x, y, z) != chunk.is_solid(x, y, z)
                {
                    mismatches += 1;
                }
            }
        }
    }
    assert_eq!(mismatches, 0, "round trip must be voxel-identical");
    assert_eq!(loaded.palette, chunk.palette);
}

#[test]
fn torn_file_keeps_earlier_slots_readable() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("regions");
    let store = RegionStore::new(&root);

    let key_a = FaceChunkKey::new(2, 0, 0, 4);
    let key_b = FaceChunkKey::new(2, 1, 0, 4);
    assert_eq!(store.region_path(&key_a), store.region_path(&key_b));

    let chunk = terrain_chunk();
    assert!(store.save_chunk(&key_a, &chunk));
    assert!(store.save_chunk(&key_b, &chunk));

    // Simulate a crash mid-append: cut the tail of the second blob
    let path = store.region_path(&key_a);
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 1000).unwrap();
    drop(file);

    let mut out = Chunk64::new();
    assert!(store.load_chunk(&key_a, &mut out), "first slot survives");
    assert!(!out.is_all_air());

    assert!(!store.load_chunk(&key_b, &mut out), "torn slot is a miss");
    assert!(out.is_all_air(), "failed load resets the out chunk");
}

#[test]
fn delta_roundtrip_representation_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegionStore::new(dir.path().join("regions"));
    let key = FaceChunkKey::new(5, -40, 12, 8);

    let mut delta = ChunkDelta::new();
    for i in (0..4000u32).map(|i| i * 7) {
        delta.apply_edit(i % 262_144, MaterialId::ROCK, MaterialId::LAVA);
    }
    let effective = delta.override_count;
    assert!(store.save_chunk_delta(&key, &delta));

    let mut loaded = ChunkDelta::new();
    assert!(store.load_chunk_delta(&key, &mut loaded));
    assert_eq!(loaded.override_count, effective);
    // Same effective overrides regardless of representation
    for i in (0..4000u32).map(|i| i * 7) {
        assert_eq!(
            loaded.override_at(i % 262_144),
            delta.override_at(i % 262_144)
        );
    }
}

#[test]
fn mixed_chunk_and_delta_slots_coexist() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegionStore::new(dir.path().join("regions"));

    // Same region file: chunk at (0, 0), delta at (5, 9)
    let chunk_key = FaceChunkKey::new(1, 0, 0, 3);
    let delta_key = FaceChunkKey::new(1, 5, 9, 3);

    let chunk = terrain_chunk();
    assert!(store.save_chunk(&chunk_key, &chunk));

    let mut delta = ChunkDelta::new();
    delta.apply_edit(123, MaterialId::ROCK, MaterialId::AIR);
    assert!(store.save_chunk_delta(&delta_key, &delta));

    let mut c = Chunk64::new();
    let mut d = ChunkDelta::new();
    assert!(store.load_chunk(&chunk_key, &mut c));
    assert!(store.load_chunk_delta(&delta_key, &mut d));
    assert_eq!(d.override_at(123), Some(MaterialId::AIR));
    assert_eq!(c.get_material(20, 35, 20), MaterialId::DIRT);
}
