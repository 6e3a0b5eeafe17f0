mod common;

use common::{aes_key, PakBuilder, Secondary, KEY, WRONG_KEY};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::thread;
use ue_pak_parser::{Error, PakFile, PakFilter, PakOptions, PakVersion};

fn open(bytes: Vec<u8>) -> PakFile<Cursor<Vec<u8>>> {
    PakFile::new(Cursor::new(bytes), PakOptions::default()).unwrap()
}

#[test]
fn legacy_archive_end_to_end() {
    let bytes = PakBuilder::legacy()
        .file("a/b.txt", b"hello from a pak")
        .file("Maps/Arena.umap", &[7; 40])
        .build();

    let mut pak = open(bytes);

    assert_eq!(pak.info().version, PakVersion::FNameBasedCompressionMethod);
    assert_eq!(pak.info().compression_methods, vec!["Zlib".to_owned()]);
    assert!(!pak.is_ready());

    pak.read_index(None, None).unwrap();

    assert_eq!(pak.mount_point(), "/Game/");

    let paths: Vec<&str> = pak.iter().map(|(path, _)| path).collect();
    assert_eq!(paths, vec!["Maps/Arena.umap", "a/b.txt"]);

    let entry = pak.get_entry("a/b.txt").unwrap();
    assert_eq!(entry.struct_size, 53);
    assert_eq!(pak.get_bytes(entry, None).unwrap(), b"hello from a pak");
    assert_eq!(pak.get_file("Maps/Arena.umap").unwrap(), vec![7; 40]);
}

#[test]
fn opens_archives_from_disk() {
    let bytes = PakBuilder::legacy().file("a/b.txt", b"on disk").build();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let mut pak = PakFile::open(file.path()).unwrap();
    pak.read_index(None, None).unwrap();

    assert_eq!(pak.len(), bytes.len() as u64);
    assert_eq!(pak.get_file("a/b.txt").unwrap(), b"on disk");
}

#[test]
fn lookups_before_the_index_is_read_fail() {
    let pak = open(PakBuilder::legacy().file("a/b.txt", b"x").build());

    assert!(matches!(pak.entries(), Err(Error::IndexNotRead)));
    assert!(matches!(pak.get_entry("a/b.txt"), Err(Error::IndexNotRead)));
    assert_eq!(pak.iter().count(), 0);
}

#[test]
fn index_can_only_be_read_once() {
    let mut pak = open(PakBuilder::legacy().file("a/b.txt", b"x").build());

    pak.read_index(None, None).unwrap();

    assert!(matches!(pak.read_index(None, None), Err(Error::IndexAlreadyRead)));
    assert_eq!(pak.entries().unwrap().len(), 1);
}

#[test]
fn missing_entries_are_reported_by_path() {
    let mut pak = open(PakBuilder::legacy().file("a/b.txt", b"x").build());
    pak.read_index(None, None).unwrap();

    match pak.get_file("a/c.txt") {
        Err(Error::EntryNotFound(path)) => assert_eq!(path, "a/c.txt"),
        other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn case_insensitive_archives_fold_paths() {
    let bytes = PakBuilder::legacy().file("Maps/Arena.umap", b"map").build();
    let options = PakOptions {
        case_sensitive: false,
    };

    let mut pak = PakFile::new(Cursor::new(bytes), options).unwrap();
    pak.read_index(None, None).unwrap();

    assert_eq!(pak.mount_point(), "/game/");
    assert!(pak.entries().unwrap().contains_key("maps/arena.umap"));
    assert_eq!(pak.get_file("MAPS/ARENA.UMAP").unwrap(), b"map");
}

#[test]
fn filter_restricts_the_index() {
    let bytes = PakBuilder::legacy()
        .file("Maps/Arena.umap", b"map")
        .file("Config/Default.ini", b"ini")
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, Some(&PakFilter::new(["/Game/Maps/"])))
        .unwrap();

    let paths: Vec<&str> = pak.iter().map(|(path, _)| path).collect();
    assert_eq!(paths, vec!["Maps/Arena.umap"]);
}

#[test]
fn modern_archive_with_full_directory_index() {
    let bytes = PakBuilder::modern()
        .file("root.txt", b"at the root")
        .file("Maps/Arena.umap", b"arena")
        .file("Maps/Sub/Deep.uasset", &[1, 2, 3])
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, None).unwrap();

    assert_eq!(pak.info().version, PakVersion::LATEST);

    let paths: Vec<&str> = pak.iter().map(|(path, _)| path).collect();
    assert_eq!(paths, vec!["Maps/Arena.umap", "Maps/Sub/Deep.uasset", "root.txt"]);

    let entry = pak.get_entry("Maps/Sub/Deep.uasset").unwrap();
    assert_eq!(entry.size, 3);
    assert_eq!(entry.struct_size, 53);
    assert_eq!(entry.hash, [0; 20]);

    assert_eq!(pak.get_file("root.txt").unwrap(), b"at the root");
    assert_eq!(pak.get_file("Maps/Sub/Deep.uasset").unwrap(), vec![1, 2, 3]);
}

#[test]
fn modern_archive_with_only_a_path_hash_index() {
    let bytes = PakBuilder::modern()
        .secondary(Secondary::PathHash)
        .file("Maps/Arena.umap", b"arena")
        .file("Maps/Lobby.umap", b"lobby")
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, None).unwrap();

    assert_eq!(pak.entries().unwrap().len(), 2);
    assert_eq!(pak.get_file("Maps/Lobby.umap").unwrap(), b"lobby");
}

#[test]
fn full_directory_wins_when_both_indexes_exist() {
    let bytes = PakBuilder::modern()
        .secondary(Secondary::Both)
        .file("Maps/Arena.umap", b"arena")
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, None).unwrap();

    assert_eq!(pak.get_file("Maps/Arena.umap").unwrap(), b"arena");
}

#[test]
fn modern_archive_without_secondary_index_is_corrupt() {
    let bytes = PakBuilder::modern()
        .secondary(Secondary::Neither)
        .file("Maps/Arena.umap", b"arena")
        .build();

    let mut pak = open(bytes);

    assert!(matches!(
        pak.read_index(None, None),
        Err(Error::CorruptIndex { .. })
    ));
    assert!(!pak.is_ready());
}

#[test]
fn encrypted_index_needs_the_right_key() {
    let bytes = PakBuilder::modern()
        .encrypt_index(KEY)
        .file("Maps/Arena.umap", b"arena")
        .build();

    let mut pak = open(bytes.clone());
    assert!(pak.info().encrypted_index);
    assert!(matches!(pak.read_index(None, None), Err(Error::MissingKey)));

    let mut pak = open(bytes.clone());
    assert!(matches!(
        pak.read_index(Some(&aes_key(&WRONG_KEY)), None),
        Err(Error::BadKey)
    ));

    let mut pak = open(bytes);
    pak.read_index(Some(&aes_key(&KEY)), None).unwrap();
    assert_eq!(pak.mount_point(), "/Game/");
    assert_eq!(pak.get_file("Maps/Arena.umap").unwrap(), b"arena");
}

#[test]
fn encrypted_legacy_index() {
    let bytes = PakBuilder::legacy()
        .encrypt_index(KEY)
        .file("a/b.txt", b"legacy and encrypted")
        .build();

    let mut pak = open(bytes);
    pak.read_index(Some(&aes_key(&KEY)), None).unwrap();

    assert_eq!(pak.get_file("a/b.txt").unwrap(), b"legacy and encrypted");
}

#[test]
fn finds_the_key_among_candidates() {
    let bytes = PakBuilder::modern()
        .encrypt_index(KEY)
        .file("Maps/Arena.umap", b"arena")
        .build();

    let pak = open(bytes);
    let keys = [aes_key(&WRONG_KEY), aes_key(&[0x22; 16]), aes_key(&KEY)];

    assert_eq!(pak.find_key(&keys).unwrap(), Some(2));
    assert_eq!(pak.find_key(&keys[..2]).unwrap(), None);
}

#[test]
fn find_key_on_plain_index_finds_nothing() {
    let pak = open(PakBuilder::legacy().file("a/b.txt", b"x").build());

    assert_eq!(pak.find_key(&[aes_key(&KEY)]).unwrap(), None);
}

#[test]
fn encrypted_entries_are_decrypted_and_truncated() {
    let payload = b"seventeen bytes!!";
    let bytes = PakBuilder::modern()
        .encrypt_index(KEY)
        .encrypted_file("Secret.bin", payload)
        .build();

    let mut pak = open(bytes);
    pak.read_index(Some(&aes_key(&KEY)), None).unwrap();

    let entry = pak.get_entry("Secret.bin").unwrap();
    assert!(entry.is_encrypted());
    assert_eq!(pak.get_bytes(entry, None).unwrap(), payload);
}

#[test]
fn encrypted_entry_in_plain_index_takes_an_explicit_key() {
    let bytes = PakBuilder::legacy()
        .encrypted_file("Secret.bin", b"needs a key")
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, None).unwrap();

    let entry = pak.get_entry("Secret.bin").unwrap();
    assert!(matches!(pak.get_bytes(entry, None), Err(Error::MissingKey)));
    assert_eq!(
        pak.get_bytes(entry, Some(&aes_key(&KEY))).unwrap(),
        b"needs a key"
    );
}

#[test]
fn compressed_entries_are_rejected() {
    let bytes = PakBuilder::legacy()
        .compressed_file("Big.bin", &[0x78; 12])
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, None).unwrap();

    let entry = pak.get_entry("Big.bin").unwrap();
    assert!(entry.is_compressed());
    assert_eq!(pak.compression_method_name(entry), Some("Zlib"));

    match pak.get_bytes(entry, None) {
        Err(Error::UnsupportedFeature(message)) => assert!(message.contains("Zlib")),
        other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn raw_bytes_of_compressed_entries_come_with_their_blocks() {
    let stored = [0x78, 0x9c, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    let bytes = PakBuilder::modern()
        .file("Small.txt", b"plain")
        .compressed_file("Big.bin", &stored)
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, None).unwrap();

    let entry = pak.get_entry("Big.bin").unwrap();
    assert!(entry.is_compressed());
    assert_eq!(entry.size, 12);
    assert_eq!(entry.uncompressed_size, 48);
    assert_eq!(entry.struct_size, 73);

    let (raw, blocks) = pak.get_raw(entry, None).unwrap();
    assert_eq!(raw, stored);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].start, 73);
    assert_eq!(blocks[0].end, 73 + 12);

    let plain = pak.get_entry("Small.txt").unwrap();
    let (raw, blocks) = pak.get_raw(plain, None).unwrap();
    assert_eq!(raw, b"plain");
    assert!(blocks.is_empty());
}

#[test]
fn raw_bytes_of_legacy_compressed_entries() {
    let bytes = PakBuilder::legacy()
        .compressed_file("Big.bin", &[0x78; 12])
        .build();

    let mut pak = open(bytes);
    pak.read_index(None, None).unwrap();

    let entry = pak.get_entry("Big.bin").unwrap();
    let (raw, blocks) = pak.get_raw(entry, None).unwrap();

    assert_eq!(raw, vec![0x78; 12]);
    assert_eq!(blocks, &entry.compression_blocks[..]);
    assert_eq!(blocks[0].end - blocks[0].start, 12);
}

#[test]
fn truncated_archives_are_rejected() {
    assert!(matches!(
        PakFile::new(Cursor::new(vec![0; 100]), PakOptions::default()),
        Err(Error::Format(_))
    ));

    let mut bytes = PakBuilder::legacy().file("a/b.txt", b"x").build();
    let magic = bytes.len() - 221 + 17;
    bytes[magic] ^= 0xFF;

    assert!(PakFile::new(Cursor::new(bytes), PakOptions::default()).is_err());
}

#[test]
fn index_outside_the_archive_is_corrupt() {
    let mut bytes = PakBuilder::legacy().file("a/b.txt", b"x").build();
    let index_size = bytes.len() - 221 + 16 + 1 + 4 + 4 + 8;
    bytes[index_size..index_size + 8].copy_from_slice(&1_000_000i64.to_le_bytes());

    let mut pak = open(bytes);

    assert!(matches!(
        pak.read_index(None, None),
        Err(Error::CorruptIndex { .. })
    ));
}

#[test]
fn encoded_entries_longer_than_the_index_are_corrupt() {
    let mut bytes = PakBuilder::modern().file("Maps/Arena.umap", b"arena").build();
    let footer = bytes.len() - 221 + 16 + 1 + 4 + 4;
    let index_offset = i64::from_le_bytes(bytes[footer..footer + 8].try_into().unwrap()) as usize;

    // mount point, entry count, seed, empty path hash slot, full directory slot
    let encoded_len = index_offset + (4 + 15) + 4 + 8 + 4 + (4 + 8 + 8 + 20);
    assert_eq!(bytes[encoded_len..encoded_len + 4], 12i32.to_le_bytes());
    bytes[encoded_len..encoded_len + 4].copy_from_slice(&0x7FFF_0000i32.to_le_bytes());

    let mut pak = open(bytes);

    match pak.read_index(None, None) {
        Err(Error::CorruptIndex { reason, .. }) => assert!(reason.contains("encoded entries")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn payloads_can_be_read_from_many_threads() {
    let mut builder = PakBuilder::modern();
    for i in 0..8 {
        builder = builder.file(&format!("Data/{}.bin", i), &vec![i as u8; 100 + i]);
    }

    let mut pak = open(builder.build());
    pak.read_index(None, None).unwrap();

    let pak = Arc::new(pak);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pak = Arc::clone(&pak);

            thread::spawn(move || {
                for _ in 0..20 {
                    let bytes = pak.get_file(&format!("Data/{}.bin", i)).unwrap();
                    assert_eq!(bytes, vec![i as u8; 100 + i]);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
