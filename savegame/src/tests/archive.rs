use std::io::Write;

use crate::{
    archive::{read_string, write_string},
    world::ObjectPath,
    FGuid, RedirectTable, Result, VersionedArchive,
};

const PHYSICS: FGuid = FGuid::new(1, 0, 0, 1);
const INVENTORY: FGuid = FGuid::new(2, 0, 0, 2);

#[test]
fn test_using_custom_version() {
    let mut writer = VersionedArchive::writer();
    assert_eq!(writer.using_custom_version(PHYSICS, 3, "Physics"), Some(3));
    assert_eq!(writer.custom_version(&PHYSICS), Some(3));

    let mut reader = VersionedArchive::reader(Vec::<u8>::new().into());
    assert_eq!(reader.using_custom_version(PHYSICS, 3, "Physics"), None);
    reader.set_custom_version(PHYSICS, 1, "Physics");
    assert_eq!(reader.using_custom_version(PHYSICS, 3, "Physics"), Some(1));
}

#[test]
fn test_consolidate_saving_is_idempotent() {
    let mut actor = VersionedArchive::writer();
    actor.using_custom_version(PHYSICS, 3, "Physics");
    actor.using_custom_version(INVENTORY, 7, "Inventory");

    let mut top = VersionedArchive::writer();
    top.using_custom_version(PHYSICS, 3, "Physics");

    actor.consolidate_versions(&mut top);
    let once = top.custom_versions().clone();
    actor.consolidate_versions(&mut top);

    assert_eq!(top.custom_versions(), &once);
    assert_eq!(once.len(), 2);
    assert_eq!(top.custom_version(&INVENTORY), Some(7));
}

#[test]
fn test_consolidate_loading_adopts_everything() {
    let mut top = VersionedArchive::reader(Vec::<u8>::new().into());
    top.set_custom_version(INVENTORY, 5, "Inventory");
    let mut package = top.package_version();
    package.ue5 = 1004;
    top.set_package_version(package);

    let mut actor = VersionedArchive::reader(Vec::<u8>::new().into());
    actor.set_custom_version(PHYSICS, 9, "Physics");
    actor.consolidate_versions(&mut top);

    assert_eq!(actor.custom_versions(), top.custom_versions());
    assert_eq!(actor.custom_version(&PHYSICS), None);
    assert_eq!(actor.package_version().ue5, 1004);
}

#[test]
#[should_panic(expected = "conflicting versions")]
fn test_consolidate_conflicting_versions() {
    let mut actor = VersionedArchive::writer();
    actor.using_custom_version(PHYSICS, 3, "Physics");
    let mut top = VersionedArchive::writer();
    top.using_custom_version(PHYSICS, 2, "Physics");
    actor.consolidate_versions(&mut top);
}

#[test]
fn test_redirects_are_exact_and_not_chained() {
    let a = ObjectPath::from("/Game/Map.Map:PersistentLevel.A");
    let b = ObjectPath::from("/Game/Map.Map:PersistentLevel.B");
    let c = ObjectPath::from("/Game/Map.Map:PersistentLevel.C");

    let mut redirects = RedirectTable::new();
    redirects.add(a.clone(), b.clone());
    redirects.add(b.clone(), c.clone());

    assert_eq!(redirects.resolve(&a), &b);
    assert_eq!(redirects.resolve(&b), &c);
    assert_eq!(redirects.resolve(&c), &c);
    assert_eq!(
        redirects.resolve(&ObjectPath::from("/Game/Map.Map:PersistentLevel.a")),
        &ObjectPath::from("/Game/Map.Map:PersistentLevel.a")
    );
}

#[test]
fn test_append_and_seek() -> Result<()> {
    let mut archive = VersionedArchive::writer();
    archive.write_all(&[0; 8])?;
    archive.seek_to(2);
    archive.append(&[1, 2])?;
    assert_eq!(archive.tell(), 10);
    archive.seek_to(0);
    archive.write_all(&[7])?;
    assert_eq!(archive.tell(), 1);
    assert_eq!(archive.len(), 10);
    assert_eq!(archive.into_bytes(), [7, 0, 0, 0, 0, 0, 0, 0, 1, 2]);
    Ok(())
}

#[test]
fn test_fstring_encodings() -> Result<()> {
    let mut archive = VersionedArchive::writer();
    write_string(&mut archive, "")?;
    write_string(&mut archive, "Wall")?;
    write_string(&mut archive, "Tür")?;
    let bytes = archive.into_bytes();

    assert_eq!(bytes[..4], [0, 0, 0, 0]);
    assert_eq!(bytes[4..8], 5i32.to_le_bytes());
    assert_eq!(bytes[13..17], (-4i32).to_le_bytes());

    let mut archive = VersionedArchive::reader(bytes.into());
    assert_eq!(read_string(&mut archive)?, "");
    assert_eq!(read_string(&mut archive)?, "Wall");
    assert_eq!(read_string(&mut archive)?, "Tür");
    Ok(())
}

#[test]
fn test_reader_rejects_writes() {
    let mut archive = VersionedArchive::reader(vec![1u8, 2, 3].into());
    assert!(archive.is_loading());
    assert!(archive.write_all(&[1]).is_err());
}
