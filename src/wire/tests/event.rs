#![cfg(test)]

use crate::wire::{Error, Kind, Stat, WireEvent};

fn encode(event: &WireEvent) -> Vec<u8> {
    let mut buf = Vec::new();
    event.encode(&mut buf).unwrap();
    buf
}

async fn decode(bytes: &[u8]) -> crate::wire::Result<WireEvent> {
    let mut src = bytes;
    WireEvent::read_from(&mut src).await
}

fn file_stat() -> Stat {
    Stat { is_dir: false, is_link: false, mode: 0o644, mtime: 1000, size: 5 }
}

#[test]
fn test_ping_is_one_byte() {
    assert_eq!(encode(&WireEvent::Ping), [0]);
}

#[test]
fn test_write_layout() {
    let event = WireEvent::Write {
        dir: ".".to_string(),
        name: "a.txt".to_string(),
        stat: file_stat(),
        content: b"hello".to_vec(),
    };
    let mut expected = vec![Kind::Write as u8];
    expected.extend_from_slice(&[1, 0, 0, 0, b'.']);
    expected.extend_from_slice(&[5, 0, 0, 0]);
    expected.extend_from_slice(b"a.txt");
    expected.extend_from_slice(&[20, 0, 0, 0]);
    let mut stat = Vec::new();
    file_stat().encode(&mut stat).unwrap();
    expected.extend_from_slice(&stat);
    expected.extend_from_slice(&[5, 0, 0, 0]);
    expected.extend_from_slice(b"hello");
    assert_eq!(encode(&event), expected);
}

#[tokio::test]
async fn test_roundtrip_every_kind() {
    let stat = file_stat();
    let events = [
        WireEvent::Ping,
        WireEvent::Write {
            dir: ".".to_string(),
            name: "a.txt".to_string(),
            stat,
            content: b"hello".to_vec(),
        },
        WireEvent::Delete { dir: "sub".to_string(), name: "gone".to_string() },
        WireEvent::Big {
            dir: "sub/inner".to_string(),
            name: "large".to_string(),
            stat: Stat { size: 5 << 20, ..stat },
            content: vec![7u8; 4096],
        },
        WireEvent::BigFinish {
            dir: ".".to_string(),
            name: "large".to_string(),
            stat: Stat { size: 5 << 20, ..stat },
            content: vec![9u8; 123],
        },
        WireEvent::BigCancel { dir: ".".to_string(), name: "large".to_string() },
    ];
    for event in events {
        let decoded = decode(&encode(&event)).await.unwrap();
        assert_eq!(decoded, event);
    }
}

#[tokio::test]
async fn test_empty_content_roundtrip() {
    let event = WireEvent::Write {
        dir: ".".to_string(),
        name: "empty".to_string(),
        stat: Stat { size: 0, ..file_stat() },
        content: Vec::new(),
    };
    assert_eq!(decode(&encode(&event)).await.unwrap(), event);
}

#[tokio::test]
async fn test_unknown_kind_fails() {
    let err = decode(&[9]).await.unwrap_err();
    assert!(matches!(err, Error::UnknownKind(9)));
}

#[tokio::test]
async fn test_truncated_frame_fails() {
    let event = WireEvent::Delete { dir: ".".to_string(), name: "a".to_string() };
    let bytes = encode(&event);
    let err = decode(&bytes[..bytes.len() - 1]).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
async fn test_oversized_name_fails() {
    let mut bytes = vec![Kind::Delete as u8];
    bytes.extend_from_slice(&[1, 0, 0, 0, b'.']);
    bytes.extend_from_slice(&[0x2C, 0x01, 0, 0]); // name length 300
    bytes.extend_from_slice(&[b'x'; 300]);
    let err = decode(&bytes).await.unwrap_err();
    assert!(matches!(err, Error::Oversize { field: "name", len: 300, max: 255 }));
}

#[tokio::test]
async fn test_oversized_stat_fails() {
    let mut bytes = vec![Kind::Write as u8];
    bytes.extend_from_slice(&[1, 0, 0, 0, b'.']);
    bytes.extend_from_slice(&[1, 0, 0, 0, b'a']);
    bytes.extend_from_slice(&[21, 0, 0, 0]);
    bytes.extend_from_slice(&[0u8; 21]);
    let err = decode(&bytes).await.unwrap_err();
    assert!(matches!(err, Error::Oversize { field: "stat", len: 21, max: 20 }));
}

#[tokio::test]
async fn test_short_stat_blob_fails() {
    let mut bytes = vec![Kind::Write as u8];
    bytes.extend_from_slice(&[1, 0, 0, 0, b'.']);
    bytes.extend_from_slice(&[1, 0, 0, 0, b'a']);
    bytes.extend_from_slice(&[19, 0, 0, 0]);
    bytes.extend_from_slice(&[0u8; 19]);
    let err = decode(&bytes).await.unwrap_err();
    assert!(matches!(err, Error::BadStatLen(19)));
}
