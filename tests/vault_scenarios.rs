//! End-to-end scenarios through the library API.

use foldervault::codec;
use foldervault::dedupe::{self, Threshold};
use foldervault::scan::{self, FileRecord};
use foldervault::{
    ErrorKind, KdfParams, VaultConfig, VaultKey, VaultKeyStore, VaultManager, VaultState,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn fast_config() -> VaultConfig {
    VaultConfig::default().with_kdf(KdfParams::fast_insecure())
}

fn write_png(path: &Path) {
    let img = image::RgbImage::from_fn(32, 32, |x, y| {
        image::Rgb([(x * 8) as u8, (y * 8) as u8, 0])
    });
    img.save(path).unwrap();
}

fn write_gradient_jpg(path: &Path, vertical: bool) {
    let img = image::RgbImage::from_fn(64, 64, |x, y| {
        let v = (if vertical { y } else { x } * 4) as u8;
        image::Rgb([v, v, v])
    });
    img.save(path).unwrap();
}

#[test]
fn encrypt_then_decrypt_restores_folder() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.png");
    fs::write(&a, b"hello").unwrap();
    write_png(&b);
    let b_original = fs::read(&b).unwrap();

    let mut vault = VaultManager::new(fast_config());
    let report = vault.encrypt_folder(dir.path(), b"pw").unwrap();
    assert_eq!(report.state, VaultState::Done);

    // Both files are now envelopes that no longer decode as their originals.
    assert_ne!(fs::read(&a).unwrap(), b"hello");
    assert!(image::open(&b).is_err());

    let err = vault
        .decrypt_folder(dir.path(), b"wrong")
        .expect_err("wrong password must fail");
    assert_eq!(err.kind, Some(ErrorKind::WrongPassword));
    assert!(image::open(&b).is_err());

    let report = vault.decrypt_folder(dir.path(), b"pw").unwrap();
    assert_eq!(report.state, VaultState::Done);
    assert_eq!(fs::read(&a).unwrap(), b"hello");
    assert_eq!(fs::read(&b).unwrap(), b_original);
}

#[test]
fn wrong_password_leaves_ciphertext_byte_identical() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), b"hello").unwrap();

    let mut vault = VaultManager::new(fast_config());
    vault.encrypt_folder(dir.path(), b"pw").unwrap();
    let before = fs::read(dir.path().join("a.txt")).unwrap();

    assert!(vault.decrypt_folder(dir.path(), b"wrong").is_err());
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), before);
}

#[test]
fn unlock_with_wrong_password_returns_no_key() {
    let dir = TempDir::new().unwrap();
    let store = VaultKeyStore::new(KdfParams::fast_insecure());
    store.create(dir.path(), b"pw").unwrap();

    let err = store
        .unlock(dir.path(), b"not-pw")
        .expect_err("wrong password must not unlock");
    assert_eq!(err.kind, Some(ErrorKind::WrongPassword));
}

#[test]
fn envelopes_are_key_bound_and_unique() {
    let k1 = VaultKey::generate();
    let k2 = VaultKey::generate();

    let plaintexts: [&[u8]; 4] = [b"", b"x", b"hello world", &[0xA5u8; 4096]];
    for plaintext in plaintexts {
        let e1 = codec::encrypt(&k1, plaintext).unwrap();
        let e2 = codec::encrypt(&k1, plaintext).unwrap();
        assert_ne!(e1.to_bytes(), e2.to_bytes());
        assert_eq!(&*codec::decrypt(&k1, &e1).unwrap(), plaintext);

        let err = codec::decrypt(&k2, &e1).expect_err("other key must fail");
        assert_eq!(err.kind, Some(ErrorKind::TamperedOrWrongKey));
    }
}

#[test]
fn tampered_tag_or_ciphertext_never_decrypts() {
    let key = VaultKey::generate();
    let sealed = codec::seal(&key, b"attack at dawn").unwrap();

    for byte in codec::HEADER_LEN - codec::TAG_LEN..sealed.len() {
        let mut tampered = sealed.clone();
        tampered[byte] ^= 0x01;
        assert!(codec::open(&key, &tampered).is_err(), "byte {} flip accepted", byte);
    }
}

#[test]
fn copies_form_one_group_and_plan_reclaims_copy_size() {
    let dir = TempDir::new().unwrap();
    let x = dir.path().join("x.jpg");
    let y = dir.path().join("y.jpg");
    let z = dir.path().join("z.jpg");
    write_gradient_jpg(&x, false);
    fs::copy(&x, &y).unwrap();
    write_gradient_jpg(&z, true);

    let records: Vec<FileRecord> = scan::scan(dir.path())
        .unwrap()
        .collect::<foldervault::Result<_>>()
        .unwrap();
    assert!(records.iter().all(|r| r.perceptual_hash.is_some()));

    let groups = dedupe::find_duplicates(records, Threshold::new(100).unwrap());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].canonical.path, x);
    assert_eq!(groups[0].duplicates.len(), 1);
    assert_eq!(groups[0].duplicates[0].path, y);

    let plan = dedupe::plan_deletion(&groups);
    assert_eq!(plan.bytes_reclaimed, fs::metadata(&y).unwrap().len());

    // Planning has no side effects.
    assert!(y.exists());

    let report = dedupe::execute_deletion(&plan).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.deleted, 1);
    assert!(x.exists() && !y.exists() && z.exists());
}

#[test]
fn loose_threshold_groups_dissimilar_images() {
    let dir = TempDir::new().unwrap();
    write_gradient_jpg(&dir.path().join("x.jpg"), false);
    write_gradient_jpg(&dir.path().join("z.jpg"), true);

    let records: Vec<FileRecord> = scan::scan(dir.path())
        .unwrap()
        .collect::<foldervault::Result<_>>()
        .unwrap();

    assert!(dedupe::find_duplicates(records.clone(), Threshold::IDENTICAL).is_empty());
    let groups = dedupe::find_duplicates(records, Threshold::new(0).unwrap());
    assert_eq!(groups.len(), 1);
}

#[test]
fn dedupe_never_sees_vault_artifacts() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    VaultManager::new(fast_config())
        .encrypt_folder(dir.path(), b"pw")
        .unwrap();

    let paths: Vec<_> = scan::scan(dir.path())
        .unwrap()
        .map(|r| r.unwrap().path)
        .collect();
    assert_eq!(paths, vec![dir.path().join("a.txt")]);
}
