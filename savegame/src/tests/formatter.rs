use std::sync::Arc;

use serde_json::json;

use super::RecordingFormatter;
use crate::{
    formatter::{BinaryFormatter, Formatter, JsonOutputFormatter, NullFormatter, ProxyFormatter},
    world::ObjectPath,
    Error, RedirectTable, Result, StructuredArchive, VersionedArchive,
};

fn binary_writer() -> StructuredArchive<BinaryFormatter> {
    StructuredArchive::new(BinaryFormatter::new(VersionedArchive::writer()))
}

fn binary_reader(bytes: Vec<u8>) -> StructuredArchive<BinaryFormatter> {
    StructuredArchive::new(BinaryFormatter::new(VersionedArchive::reader(bytes.into())))
}

fn into_bytes(ar: StructuredArchive<BinaryFormatter>) -> Vec<u8> {
    ar.into_formatter().into_archive().into_bytes()
}

/// A small traversal touching records, arrays and an optional field.
fn traverse<F: Formatter>(ar: &mut StructuredArchive<F>) -> Result<Option<u32>> {
    ar.record(|ar| {
        ar.serialize_field("Name", &mut String::from("Crate"))?;
        let mut len = 2;
        ar.field("Values", |ar| {
            ar.array(&mut len, |ar, _| {
                ar.array_element(|ar| ar.value(&mut 1u16))?;
                ar.array_element(|ar| ar.value(&mut 2u16))
            })
        })?;
        ar.try_field("Optional", true, |ar| {
            let mut value = 7u32;
            ar.value(&mut value)?;
            Ok(value)
        })
    })
}

#[test]
fn test_json_document_shape() -> Result<()> {
    let mut ar = StructuredArchive::new(JsonOutputFormatter::new());
    ar.record(|ar| {
        ar.serialize_field("Name", &mut String::from("Crate"))?;
        ar.serialize_field("Count", &mut 3u32)?;
        ar.serialize_field("Ratio", &mut 0.5f64)?;
        ar.serialize_field("Enabled", &mut true)?;

        let mut rows = 2;
        ar.field("Grid", |ar| {
            ar.array(&mut rows, |ar, rows| {
                for row in 0..rows {
                    let mut cols = 2;
                    ar.array_element(|ar| {
                        ar.array(&mut cols, |ar, cols| {
                            for col in 0..cols {
                                let mut cell = (row * 2 + col) as i32;
                                ar.array_element(|ar| ar.value(&mut cell))?;
                            }
                            Ok(())
                        })
                    })?;
                }
                Ok(())
            })
        })?;

        let mut len = 2;
        ar.field("Stock", |ar| {
            ar.map(&mut len, |ar, _| {
                ar.map_element(&mut String::from("Apples"), |ar| ar.value(&mut 4u8))?;
                ar.map_element(&mut String::from("Pears"), |ar| ar.value(&mut 0u8))
            })
        })?;

        ar.field("Weight", |ar| {
            ar.attributed_value(|ar| {
                ar.attribute("Unit", |ar| ar.value(&mut String::from("kg")))?;
                ar.try_attribute("Precision", false, |ar| ar.value(&mut 2u8))?;
                ar.attributed_value_value(|ar| ar.value(&mut 12.5f32))
            })
        })?;

        ar.try_field("Missing", false, |ar| ar.value(&mut 1u8))?;

        ar.field("Events", |ar| {
            ar.stream(|ar| {
                for i in 0..2u32 {
                    let mut id = i;
                    ar.stream_element(|ar| ar.record(|ar| ar.serialize_field("Id", &mut id)))?;
                }
                Ok(())
            })
        })?;

        ar.serialize_field("Target", &mut Some(ObjectPath::from("/Game/A.A:PersistentLevel.B")))?;
        ar.serialize_field("Nothing", &mut None::<ObjectPath>)
    })?;

    let formatter = ar.into_formatter();
    let expected = json!({
        "Name": "Crate",
        "Count": 3,
        "Ratio": 0.5,
        "Enabled": 1,
        "Grid": [[0, 1], [2, 3]],
        "Stock": { "Apples": 4, "Pears": 0 },
        "Weight": { "Unit": "kg", "_Value": 12.5 },
        "Events": [{ "Id": 0 }, { "Id": 1 }],
        "Target": "/Game/A.A:PersistentLevel.B",
        "Nothing": null,
    });
    assert_eq!(formatter.root(), Some(&expected));
    Ok(())
}

#[test]
fn test_json_rewritten_field_keeps_position() -> Result<()> {
    let mut ar = StructuredArchive::new(JsonOutputFormatter::new());
    ar.record(|ar| {
        ar.serialize_field("Offset", &mut 0u64)?;
        ar.serialize_field("Body", &mut String::from("..."))?;
        ar.rewrite(|ar| ar.serialize_field("Offset", &mut 42u64))
    })?;

    let root = ar.into_formatter().into_root().unwrap();
    assert_eq!(root["Offset"], 42);
    assert_eq!(root.keys().collect::<Vec<_>>(), ["Offset", "Body"]);
    Ok(())
}

#[test]
fn test_json_nan_is_null() -> Result<()> {
    let mut ar = StructuredArchive::new(JsonOutputFormatter::new());
    let mut nan = f32::NAN;
    ar.record(|ar| ar.serialize_field("Value", &mut nan))?;
    assert_eq!(ar.into_formatter().into_root().unwrap()["Value"], json!(null));
    Ok(())
}

#[test]
fn test_json_graft() -> Result<()> {
    let mut subtree = serde_json::Map::new();
    subtree.insert("Name".into(), json!("Wall"));

    let mut ar = StructuredArchive::new(JsonOutputFormatter::new());
    ar.record(|ar| {
        ar.field("Actor", |ar| {
            ar.record(|ar| {
                ar.formatter_mut().graft(subtree);
                Ok(())
            })
        })
    })?;
    assert_eq!(
        ar.into_formatter().root(),
        Some(&json!({ "Actor": { "Name": "Wall" } }))
    );
    Ok(())
}

#[test]
#[should_panic(expected = "already has fields")]
fn test_json_graft_into_filled_record() {
    let mut json = JsonOutputFormatter::new();
    json.enter_record().unwrap();
    json.enter_field("A").unwrap();
    json.serialize(crate::Value::U8(&mut 1)).unwrap();
    json.leave_field().unwrap();
    json.graft(serde_json::Map::new());
}

#[test]
#[should_panic(expected = "JSON root assigned twice")]
fn test_json_root_assigned_twice() {
    let mut json = JsonOutputFormatter::new();
    json.enter_record().unwrap();
    json.leave_record().unwrap();
    json.enter_record().unwrap();
    json.leave_record().unwrap();
}

#[test]
#[should_panic(expected = "must be entered directly inside Record")]
fn test_field_inside_stream() {
    let mut ar = StructuredArchive::new(JsonOutputFormatter::new());
    ar.stream(|ar| ar.serialize_field("Oops", &mut 1u8)).unwrap();
}

#[test]
#[should_panic(expected = "without a named slot")]
fn test_value_inside_record_without_field() {
    let mut ar = StructuredArchive::new(NullFormatter);
    ar.record(|ar| ar.value(&mut 1u8)).unwrap();
}

#[test]
#[should_panic(expected = "second root value")]
fn test_second_root_value() {
    let mut ar = StructuredArchive::new(NullFormatter);
    ar.record(|_| Ok(())).unwrap();
    ar.record(|_| Ok(())).unwrap();
}

#[test]
#[should_panic(expected = "already holds a value")]
fn test_second_value_in_field() {
    let mut ar = binary_writer();
    ar.record(|ar| {
        ar.field("X", |ar| {
            ar.value(&mut 1u32)?;
            ar.value(&mut 2u32)
        })
    })
    .unwrap();
}

#[test]
#[should_panic(expected = "already holds a value")]
fn test_container_after_value_in_array_element() {
    let mut ar = StructuredArchive::new(NullFormatter);
    let mut len = 1;
    ar.array(&mut len, |ar, _| {
        ar.array_element(|ar| {
            ar.value(&mut 1u8)?;
            ar.record(|_| Ok(()))
        })
    })
    .unwrap();
}

#[test]
#[should_panic(expected = "duplicate name \"Y\"")]
fn test_duplicate_field_name() {
    let mut ar = StructuredArchive::new(JsonOutputFormatter::new());
    ar.record(|ar| {
        ar.serialize_field("Y", &mut 1u32)?;
        ar.serialize_field("Y", &mut 2u32)
    })
    .unwrap();
}

#[test]
#[should_panic(expected = "duplicate name \"Key\"")]
fn test_duplicate_map_key_when_writing() {
    let mut ar = binary_writer();
    let mut len = 2;
    ar.map(&mut len, |ar, _| {
        ar.map_element(&mut String::from("Key"), |ar| ar.value(&mut 1u8))?;
        ar.map_element(&mut String::from("Key"), |ar| ar.value(&mut 2u8))
    })
    .unwrap();
}

#[test]
fn test_duplicate_map_key_in_data() {
    let mut bytes = vec![2, 0, 0, 0];
    for value in [1u8, 2] {
        bytes.extend([2, 0, 0, 0, b'A', 0, value]);
    }
    let mut ar = binary_reader(bytes);
    let mut len = 0;
    let result = ar.map(&mut len, |ar, len| {
        for _ in 0..len {
            let mut name = String::new();
            ar.map_element(&mut name, |ar| ar.value(&mut 0u8))?;
        }
        Ok(())
    });
    assert!(matches!(result, Err(Error::Other(message)) if message.contains("duplicate map key")));
}

#[test]
fn test_same_name_in_different_records() -> Result<()> {
    let mut ar = StructuredArchive::new(JsonOutputFormatter::new());
    ar.record(|ar| {
        ar.field("Inner", |ar| ar.record(|ar| ar.serialize_field("Name", &mut 1u8)))?;
        ar.serialize_field("Name", &mut 2u8)
    })?;
    let root = ar.into_formatter().into_root().unwrap();
    assert_eq!(root["Inner"]["Name"], 1);
    assert_eq!(root["Name"], 2);
    Ok(())
}

#[test]
fn test_proxy_forwards_every_call_to_both() -> Result<()> {
    let mut direct = StructuredArchive::new(RecordingFormatter::new(true));
    traverse(&mut direct)?;
    let direct = direct.into_formatter().calls;

    let mut proxy = StructuredArchive::new(ProxyFormatter::new(
        RecordingFormatter::new(true),
        RecordingFormatter::new(true),
    ));
    assert_eq!(traverse(&mut proxy)?, Some(7));
    let (primary, secondary) = proxy.into_formatter().into_inner();

    assert_eq!(primary.calls, direct);
    assert_eq!(secondary.calls, direct);
    Ok(())
}

#[test]
fn test_proxy_with_null_secondary_matches_primary() -> Result<()> {
    for present in [true, false] {
        let mut direct = StructuredArchive::new(RecordingFormatter::new(present));
        let expected = traverse(&mut direct)?;

        let mut proxy = StructuredArchive::new(ProxyFormatter::new(
            RecordingFormatter::new(present),
            NullFormatter,
        ));
        assert_eq!(traverse(&mut proxy)?, expected);
        let (primary, _) = proxy.into_formatter().into_inner();
        assert_eq!(primary.calls, direct.into_formatter().calls);
    }
    Ok(())
}

#[test]
fn test_proxy_disagreement_leaves_entered_side() -> Result<()> {
    let mut proxy = ProxyFormatter::new(RecordingFormatter::new(true), RecordingFormatter::new(false));
    assert!(!proxy.try_enter_field("Extra", true)?);
    assert!(!proxy.try_enter_attribute("Meta", true)?);

    let (primary, secondary) = proxy.into_inner();
    assert_eq!(
        primary.calls,
        [
            "try_enter_field Extra true",
            "leave_field",
            "try_enter_attribute Meta true",
            "leave_attribute",
        ]
    );
    assert_eq!(
        secondary.calls,
        ["try_enter_field Extra true", "try_enter_attribute Meta true"]
    );
    Ok(())
}

#[test]
fn test_binary_layout() -> Result<()> {
    let mut ar = binary_writer();
    ar.record(|ar| {
        ar.serialize_field("Flag", &mut true)?;
        ar.try_field("Skipped", false, |ar| ar.value(&mut 9u32))?;
        ar.serialize_field("Text", &mut String::from("Hi"))?;
        let mut len = 2;
        ar.field("Values", |ar| {
            ar.array(&mut len, |ar, _| {
                ar.array_element(|ar| ar.value(&mut 1u16))?;
                ar.array_element(|ar| ar.value(&mut 2u16))
            })
        })
    })?;

    assert_eq!(
        into_bytes(ar),
        [1, 0, 0, 0, 0, 3, 0, 0, 0, b'H', b'i', 0, 2, 0, 0, 0, 1, 0, 2, 0]
    );
    Ok(())
}

#[test]
fn test_binary_round_trip_of_mixed_record() -> Result<()> {
    let mut ar = binary_writer();
    ar.record(|ar| {
        ar.serialize_field("Name", &mut String::from("Grüße"))?;
        ar.serialize_field("Guid", &mut crate::FGuid::new(1, 2, 3, 4))?;
        ar.serialize_field("Blob", &mut vec![9u8, 8, 7])?;
        ar.try_field("Note", true, |ar| ar.value(&mut String::from("present")))?;
        ar.serialize_field("Scale", &mut -1.25f64)
    })?;

    let mut ar = binary_reader(into_bytes(ar));
    let mut name = String::new();
    let mut guid = crate::FGuid::nil();
    let mut blob = vec![];
    let mut note = String::new();
    let mut scale = 0f64;
    ar.record(|ar| {
        ar.serialize_field("Name", &mut name)?;
        ar.serialize_field("Guid", &mut guid)?;
        ar.serialize_field("Blob", &mut blob)?;
        ar.try_field("Note", false, |ar| ar.value(&mut note))?;
        ar.serialize_field("Scale", &mut scale)
    })?;

    assert_eq!(name, "Grüße");
    assert_eq!(guid, crate::FGuid::new(1, 2, 3, 4));
    assert_eq!(blob, [9, 8, 7]);
    assert_eq!(note, "present");
    assert_eq!(scale, -1.25);
    Ok(())
}

#[test]
fn test_binary_rejects_invalid_bool() {
    let mut ar = binary_reader(vec![2, 0, 0, 0]);
    let mut flag = false;
    assert!(ar.value(&mut flag).is_err());
}

#[test]
fn test_binary_rejects_counts_beyond_the_data() {
    let mut ar = binary_reader(vec![0xFF, 0xFF, 0xFF, 0x7F, 1, 2]);
    let mut len = 0;
    let result = ar.array(&mut len, |ar, len| {
        let mut items = vec![0u8; len];
        for item in &mut items {
            ar.array_element(|ar| ar.value(item))?;
        }
        Ok(())
    });
    assert!(matches!(result, Err(Error::Other(message)) if message.contains("exceeds")));

    // two map entries need at least eight bytes of names
    let mut ar = binary_reader(vec![2, 0, 0, 0, 0, 0, 0, 0]);
    let result = ar.map(&mut len, |_, _| Ok(()));
    assert!(result.is_err());

    let mut ar = binary_reader(vec![0xFF, 0xFF, 0xFF, 0x7F, b'a']);
    assert!(ar.value(&mut String::new()).is_err());
}

#[test]
fn test_binary_object_references_follow_redirects() -> Result<()> {
    let old = ObjectPath::from("/Game/Maps/Arena.Arena:PersistentLevel.Crate");
    let new = ObjectPath::from("/Game/Maps/Arena.Arena:PersistentLevel.Crate_1");

    let mut ar = binary_writer();
    ar.record(|ar| {
        ar.serialize_field("Target", &mut Some(old.clone()))?;
        ar.serialize_field("Empty", &mut None::<ObjectPath>)
    })?;

    let mut redirects = RedirectTable::new();
    redirects.add(old.clone(), new.clone());
    let mut ar = binary_reader(into_bytes(ar));
    ar.underlying_archive()
        .unwrap()
        .set_redirects(Arc::new(redirects));

    let mut target = None;
    let mut empty = Some(old);
    ar.record(|ar| {
        ar.serialize_field("Target", &mut target)?;
        ar.serialize_field("Empty", &mut empty)
    })?;
    assert_eq!(target, Some(new));
    assert_eq!(empty, None);
    Ok(())
}
