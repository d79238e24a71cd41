//! Save paths outside the device root go to the host directory backend

use std::fs;
use std::io::{Read, Write};
use vmu_saves::{
    DeviceAddress, MemoryBus, MemoryDevice, SaveError, SaveFileManager, SaveManagerBuilder,
};

fn create_manager(save_path: &str) -> SaveFileManager<MemoryBus> {
    let a1 = DeviceAddress::new('a', 1).unwrap();
    SaveManagerBuilder::new()
        .device_bus(MemoryBus::new().with_device(a1, MemoryDevice::new(1)))
        .save_path(save_path)
        .build()
        .unwrap()
}

#[test]
fn test_directory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap();
    let mut saves = create_manager(path);
    assert!(!saves.is_device_path());

    saves.save("grim.s01", b"Manny Calavera").unwrap();
    assert_eq!(saves.load("grim.s01").unwrap(), b"Manny Calavera");
    assert_eq!(saves.list("grim.s##").unwrap(), vec!["grim.s01"]);

    // Compressed by default on disk too
    let stored = fs::read(dir.path().join("grim.s01")).unwrap();
    assert!(vmu_saves::core::compression::is_compressed(&stored));

    assert!(saves.remove("grim.s01").unwrap());
    assert!(saves.list("*").unwrap().is_empty());
    assert!(matches!(saves.remove("grim.s01"), Err(SaveError::NotFound(_))));
}

#[test]
fn test_plain_files_from_elsewhere_are_readable() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("legacy.sav"), b"uncompressed").unwrap();

    let mut saves = create_manager(dir.path().to_str().unwrap());
    let mut text = String::new();
    saves
        .open_for_read("legacy.sav")
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "uncompressed");
}

#[test]
fn test_switching_between_card_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let host = dir.path().to_str().unwrap().to_string();
    let mut saves = create_manager("/vmu/a1");

    saves.save("on-card", b"vmu").unwrap();
    saves.set_save_path(&host);
    saves.save("on-disk", b"host").unwrap();
    assert_eq!(saves.list("*").unwrap(), vec!["on-disk"]);

    saves.set_save_path("/vmu/a1");
    assert_eq!(saves.list("*").unwrap(), vec!["on-card"]);
    assert!(matches!(
        saves.open_for_read("on-disk"),
        Err(SaveError::NotFound(_))
    ));
}

#[test]
fn test_uncommitted_directory_write_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut saves = create_manager(dir.path().to_str().unwrap());

    {
        let mut writer = saves.open_for_write_with("partial", false).unwrap();
        writer.write_all(b"half a save").unwrap();
    }

    assert!(saves.list("*").unwrap().is_empty());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
