//! Writer → parser round trips against a fresh destination store.

use harbor_hash::Hasher;
use harbor_object::{store, ObjectType};
use harbor_pack::{parse_pack, write_pack};
use harbor_storage::{AbortSignal, MemoryStorage, Storage};

fn repo(name: &str) -> MemoryStorage {
    let mut s = MemoryStorage::new();
    s.init(name).unwrap();
    s
}

#[test]
fn pack_roundtrip_preserves_every_object() {
    let mut src = repo("src");

    let commit_payload: &[u8] = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A <a@b.c> 0 +0000\n\
committer A <a@b.c> 0 +0000\n\
\n\
initial\n";
    let objects: Vec<(ObjectType, Vec<u8>)> = vec![
        (ObjectType::Blob, b"first file".to_vec()),
        (ObjectType::Blob, b"".to_vec()),
        (ObjectType::Tree, Vec::new()),
        (ObjectType::Commit, commit_payload.to_vec()),
    ];

    let mut oids = Vec::new();
    for (kind, payload) in &objects {
        oids.push(store::write_object(&mut src, *kind, payload).unwrap());
    }

    let pack = write_pack(&src, &oids).unwrap();

    let mut dst = repo("dst");
    let summary = parse_pack(&mut dst, &pack, &AbortSignal::new()).unwrap();
    assert!(summary.checksum_ok);
    assert_eq!(summary.objects.len(), objects.len());

    for (oid, (kind, payload)) in oids.iter().zip(&objects) {
        let (got_kind, got_payload) = store::read_object(&dst, oid).unwrap();
        assert_eq!(got_kind, *kind);
        assert_eq!(&got_payload, payload);
    }
}

#[test]
fn parsed_oids_match_writer_input_order() {
    let mut src = repo("src");
    let a = store::write_object(&mut src, ObjectType::Blob, b"aaa").unwrap();
    let b = store::write_object(&mut src, ObjectType::Blob, b"bbb").unwrap();

    let pack = write_pack(&src, &[b, a]).unwrap();
    let mut dst = repo("dst");
    let summary = parse_pack(&mut dst, &pack, &AbortSignal::new()).unwrap();

    let order: Vec<_> = summary.objects.iter().map(|o| o.oid).collect();
    assert_eq!(order, [b, a]);
}

#[test]
fn duplicate_content_across_packs_is_deduplicated() {
    let mut src = repo("src");
    let oid = store::write_object(&mut src, ObjectType::Blob, b"dup").unwrap();
    let pack = write_pack(&src, &[oid]).unwrap();

    let mut dst = repo("dst");
    parse_pack(&mut dst, &pack, &AbortSignal::new()).unwrap();
    parse_pack(&mut dst, &pack, &AbortSignal::new()).unwrap();

    assert_eq!(oid, Hasher::hash_object("blob", b"dup"));
    assert_eq!(store::read_object(&dst, &oid).unwrap().1, b"dup");
}
