//! Create-then-decrypt round trips over the 512-byte header blob.

use noxvolume::{
    largest_serialized_key_size, EaKind, EncryptionAlgorithm, EncryptionMode, HashFunction,
    Pkcs5Kdf, SecureBuffer, VolumeHeader, VolumeHeaderCreationOptions, VolumeType,
};

const HEADER_SIZE: usize = 512;
const DATA_START: u64 = 131_072;

fn sha512_kdf() -> Pkcs5Kdf {
    Pkcs5Kdf::new(HashFunction::Sha512)
}

/// Creates a volume header blob with an all-zero salt and data key, the
/// header key derived from `password`.
fn create_volume(
    kind: EaKind,
    volume_type: VolumeType,
    volume_data_size: u64,
    password: &[u8],
    pim: u32,
) -> Vec<u8> {
    let kdf = sha512_kdf();
    let ea = EncryptionAlgorithm::new(kind);
    let key_size = ea.key_size();

    let salt_bytes = [0u8; 64];
    let mut header_key = SecureBuffer::new(largest_serialized_key_size(&[ea.get_new()]));
    kdf.derive_key(header_key.as_mut_slice(), password, pim, &salt_bytes)
        .unwrap();

    let mut salt = SecureBuffer::new(64);
    salt.copy_from(&salt_bytes).unwrap();

    let options = VolumeHeaderCreationOptions {
        ea,
        kdf,
        data_key: SecureBuffer::new(2 * key_size),
        salt,
        header_key,
        volume_data_start: DATA_START,
        volume_data_size,
        sector_size: 512,
        volume_type,
    };

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    let mut blob = vec![0u8; HEADER_SIZE];
    header.create(&mut blob, options).unwrap();
    blob
}

fn narrow_lists(
    kind: EaKind,
) -> (Vec<Pkcs5Kdf>, Vec<EncryptionAlgorithm>, Vec<EncryptionMode>) {
    (
        vec![sha512_kdf()],
        vec![EncryptionAlgorithm::new(kind)],
        vec![EncryptionMode::new_xts()],
    )
}

#[test]
fn create_then_decrypt_round_trip() {
    let blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 0);
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    let found = header
        .decrypt(&blob, b"test", 0, None, false, &kdfs, &algos, &modes)
        .unwrap();

    assert!(found);
    assert_eq!(header.volume_data_size(), 1_048_576);
    assert_eq!(header.encrypted_area_start(), DATA_START);
    assert_eq!(header.encrypted_area_length(), 1_048_576);
    assert_eq!(header.sector_size(), 512);
    assert_eq!(header.volume_type(), VolumeType::Normal);
    assert_eq!(header.hidden_volume_data_size(), 0);
    assert_eq!(header.flags(), 0);
    assert_eq!(header.volume_creation_time(), 0);
    assert_eq!(header.header_creation_time(), 0);
    assert_eq!(header.data_area_key()[..64], [0u8; 64]);

    let ea = header.ea().expect("algorithm latched");
    assert_eq!(ea.name(), "AES");
    assert_eq!(ea.mode().unwrap().name(), "XTS");
    assert_eq!(header.pkcs5().unwrap().name(), "HMAC-SHA-512");
    assert_eq!(header.salt(), &[0u8; 64]);
}

#[test]
fn hidden_volume_detection() {
    let blob = create_volume(EaKind::Aes, VolumeType::Hidden, 65_536, b"test", 1);
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    assert!(header
        .decrypt(&blob, b"test", 1, None, false, &kdfs, &algos, &modes)
        .unwrap());

    assert_eq!(header.hidden_volume_data_size(), 65_536);
    assert_eq!(header.volume_data_size(), 65_536);
    assert_eq!(header.volume_type(), VolumeType::Hidden);
}

#[test]
fn wrong_password_returns_false_without_latching() {
    let blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 1);
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    let found = header
        .decrypt(&blob, b"tesu", 1, None, false, &kdfs, &algos, &modes)
        .unwrap();

    assert!(!found);
    assert!(header.ea().is_none());
    assert!(header.pkcs5().is_none());
    assert_eq!(header.volume_data_size(), 0);
    assert_eq!(header.volume_type(), VolumeType::Unknown);
}

#[test]
fn wrong_pim_returns_false() {
    let blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 1);
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    assert!(!header
        .decrypt(&blob, b"test", 2, None, false, &kdfs, &algos, &modes)
        .unwrap());
}

#[test]
fn bit_flip_in_encrypted_region_fails_cleanly() {
    let mut blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 1);
    blob[256] ^= 0x01;
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    let found = header
        .decrypt(&blob, b"test", 1, None, false, &kdfs, &algos, &modes)
        .unwrap();
    assert!(!found);
    assert!(header.ea().is_none());
}

#[test]
fn bit_flips_across_the_encrypted_region_all_fail() {
    let blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 1);
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    for offset in [64, 127, 255, 320, 448, 511] {
        let mut corrupted = blob.clone();
        corrupted[offset] ^= 0x80;
        let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
        let found = header
            .decrypt(&corrupted, b"test", 1, None, false, &kdfs, &algos, &modes)
            .unwrap();
        assert!(!found, "flip at offset {offset} must not decrypt");
    }
}

#[test]
fn salt_flip_changes_derived_key_and_fails() {
    let mut blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 1);
    blob[0] ^= 0x01;
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    assert!(!header
        .decrypt(&blob, b"test", 1, None, false, &kdfs, &algos, &modes)
        .unwrap());
}

#[test]
fn cascade_volume_round_trip() {
    let blob = create_volume(
        EaKind::SerpentTwofishAes,
        VolumeType::Normal,
        2_097_152,
        b"cascade pass",
        1,
    );
    let (kdfs, algos, modes) = narrow_lists(EaKind::SerpentTwofishAes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    assert!(header
        .decrypt(&blob, b"cascade pass", 1, None, false, &kdfs, &algos, &modes)
        .unwrap());
    assert_eq!(header.ea().unwrap().name(), "Serpent-Twofish-AES");
    assert_eq!(header.volume_data_size(), 2_097_152);
}

#[test]
fn full_catalog_search_finds_the_volume() {
    let blob = create_volume(EaKind::Twofish, VolumeType::Normal, 1_048_576, b"test", 1);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    let found = header
        .decrypt(
            &blob,
            b"test",
            1,
            None,
            false,
            &noxvolume::available_kdfs(false),
            &noxvolume::available_algorithms(),
            &noxvolume::available_modes(),
        )
        .unwrap();

    assert!(found);
    assert_eq!(header.ea().unwrap().name(), "Twofish");
    assert_eq!(header.pkcs5().unwrap().name(), "HMAC-SHA-512");
}

#[test]
fn reencrypt_round_trips_after_decrypt() {
    let blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 1);
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    assert!(header
        .decrypt(&blob, b"test", 1, None, false, &kdfs, &algos, &modes)
        .unwrap());

    // Re-encrypt with the latched salt and header key; the result must
    // decrypt again with the same password and carry the same fields.
    let mut reencrypted = vec![0u8; HEADER_SIZE];
    header.encrypt(&mut reencrypted).unwrap();
    assert_eq!(&reencrypted[..64], &blob[..64]);

    let mut reread = VolumeHeader::new(HEADER_SIZE).unwrap();
    assert!(reread
        .decrypt(&reencrypted, b"test", 1, None, false, &kdfs, &algos, &modes)
        .unwrap());
    assert_eq!(reread.volume_data_size(), header.volume_data_size());
    assert_eq!(reread.encrypted_area_start(), header.encrypted_area_start());
    assert_eq!(reread.sector_size(), header.sector_size());
    assert_eq!(reread.data_area_key(), header.data_area_key());
}

#[test]
fn latched_algorithm_handles_data_sectors() {
    let blob = create_volume(EaKind::Aes, VolumeType::Normal, 1_048_576, b"test", 1);
    let (kdfs, algos, modes) = narrow_lists(EaKind::Aes);

    let mut header = VolumeHeader::new(HEADER_SIZE).unwrap();
    assert!(header
        .decrypt(&blob, b"test", 1, None, false, &kdfs, &algos, &modes)
        .unwrap());

    // The latched algorithm is keyed from the data-area key and stays
    // usable after the header is dropped.
    let ea = header.ea().unwrap();
    drop(header);

    let mut sector = vec![0x55u8; 512];
    let plain = sector.clone();
    ea.encrypt_sectors(&mut sector, 3, 512).unwrap();
    assert_ne!(sector, plain);
    ea.decrypt_sectors(&mut sector, 3, 512).unwrap();
    assert_eq!(sector, plain);
}
