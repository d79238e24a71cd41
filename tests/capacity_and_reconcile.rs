//! Capacity accounting and fingerprint short-circuit behaviour

use std::io::Write;
use vmu_saves::{
    DeviceAddress, MemoryBus, MemoryDevice, SaveError, SaveFileManager, SaveManagerBuilder,
    BLOCK_SIZE,
};

fn a1() -> DeviceAddress {
    DeviceAddress::new('a', 1).unwrap()
}

fn manager_with_blocks(blocks: usize) -> SaveFileManager<MemoryBus> {
    SaveManagerBuilder::new()
        .device_bus(MemoryBus::new().with_device(a1(), MemoryDevice::with_user_blocks(1, blocks)))
        .compress(false)
        .name_seed(3)
        .build()
        .unwrap()
}

fn card(saves: &SaveFileManager<MemoryBus>) -> &MemoryDevice {
    saves.bus().get(a1()).unwrap()
}

#[test]
fn test_ten_block_card_scenario() {
    let mut saves = manager_with_blocks(10);
    assert_eq!(card(&saves).free_blocks(), 10);

    saves.save("SAVE1", &vec![0xA5; 4000]).unwrap();
    assert_eq!(card(&saves).free_blocks(), 0);
    let writes = card(&saves).stats().writes;

    let result = saves.open_for_write("SAVE2");
    assert!(matches!(result, Err(SaveError::CapacityExceeded { .. })));
    drop(result);

    assert_eq!(card(&saves).stats().writes, writes);
    assert_eq!(saves.list("*").unwrap(), vec!["SAVE1"]);
    assert_eq!(saves.load("save1").unwrap(), vec![0xA5; 4000]);
}

#[test]
fn test_overwrite_can_reuse_its_own_space() {
    let mut saves = manager_with_blocks(10);
    saves.save("SAVE1", &vec![1u8; 4000]).unwrap();

    // On a full card the replaced package's blocks count as free
    saves.save("SAVE1", &vec![2u8; 4400]).unwrap();
    assert_eq!(saves.load("SAVE1").unwrap(), vec![2u8; 4400]);
    assert_eq!(card(&saves).entry_names().len(), 1);
}

#[test]
fn test_write_past_capacity_fails_and_discards() {
    let mut saves = manager_with_blocks(4);
    saves.list("*").unwrap();
    let writes = card(&saves).stats().writes;

    let mut writer = saves.open_for_write("overflow").unwrap();
    let err = writer.write_all(&vec![0u8; 4 * BLOCK_SIZE]).unwrap_err();
    assert!(matches!(
        SaveError::from_io(err),
        SaveError::CapacityExceeded { .. }
    ));
    assert!(matches!(writer.commit(), Err(SaveError::WriteAborted(_))));

    assert_eq!(card(&saves).stats().writes, writes);
    assert!(saves.list("*").unwrap().is_empty());
}

#[test]
fn test_exact_fit() {
    let mut saves = manager_with_blocks(2);
    let capacity = 2 * BLOCK_SIZE - 128 - 512 - "fit".len() - 5;

    let mut writer = saves.open_for_write("fit").unwrap();
    writer.write_all(&vec![9u8; capacity]).unwrap();
    writer.commit().unwrap();
    assert_eq!(card(&saves).free_blocks(), 0);
    assert_eq!(saves.load("fit").unwrap().len(), capacity);
}

#[test]
fn test_second_reconcile_does_not_rescan() {
    let mut saves = manager_with_blocks(200);
    saves.save("a", b"1").unwrap();
    saves.save("b", b"2").unwrap();

    let first = saves.list("*").unwrap();
    saves.bus_mut().get_mut(a1()).unwrap().reset_stats();

    let second = saves.list("*").unwrap();
    assert_eq!(first, second);

    let stats = card(&saves).stats();
    assert_eq!(stats.enumerations, 0);
    assert_eq!(stats.entry_reads, 0);
    assert_eq!(stats.root_reads, 1);
    assert_eq!(stats.fat_reads, 1);
}

#[test]
fn test_own_writes_do_not_trigger_rescan() {
    let mut saves = manager_with_blocks(200);
    saves.list("*").unwrap();
    saves.bus_mut().get_mut(a1()).unwrap().reset_stats();

    saves.save("x", b"data").unwrap();
    assert!(saves.remove("x").unwrap());
    saves.save("y", b"data").unwrap();
    assert_eq!(saves.load("y").unwrap(), b"data");

    assert_eq!(card(&saves).stats().enumerations, 0);
    assert_eq!(card(&saves).stats().entry_reads, 0);
}

#[test]
fn test_external_write_triggers_one_rescan() {
    let mut saves = manager_with_blocks(200);
    saves.save("mine", b"data").unwrap();

    // Another tool drops an unrelated file on the card
    use vmu_saves::SaveDevice;
    saves
        .bus_mut()
        .get_mut(a1())
        .unwrap()
        .write_entry("ICONDATA", b"foreign", true)
        .unwrap();
    saves.bus_mut().get_mut(a1()).unwrap().reset_stats();

    assert_eq!(saves.list("*").unwrap(), vec!["mine"]);
    assert_eq!(card(&saves).stats().enumerations, 1);

    saves.list("*").unwrap();
    assert_eq!(card(&saves).stats().enumerations, 1);
}
