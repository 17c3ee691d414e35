#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Write};

    use ingest_core::keyring::{
        legacy_decrypt, legacy_encrypt, seal_legacy, KeyRing, KeyRingError, KeyRingFile, LegacyHeader,
        LEGACY_HEADER_LEN,
    };
    use ingest_core::stream::EncryptOptions;

    const PASS: &str = "correct horse battery staple";

    fn ring_file() -> KeyRingFile {
        KeyRingFile::generate(PASS).unwrap()
    }

// ## 1️⃣ Keyring file

    #[test]
    fn keyring_survives_json_round_trip_and_unlocks() {
        let file = ring_file();
        let mut json = Vec::new();
        file.write_to(&mut json).unwrap();

        let ring = KeyRing::unlock(Cursor::new(&json), PASS).unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.public_keys(), file.public_keys().unwrap());
        // No secret material in the serialized form.
        let text = String::from_utf8(json).unwrap();
        assert!(text.contains("sealed_secret"));
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let err = KeyRing::from_file(&ring_file(), "not it").unwrap_err();
        assert!(matches!(err, KeyRingError::WrongPassword), "{err}");
        assert!(err.is_user_error());
    }

    #[test]
    fn one_bad_entry_fails_the_whole_ring() {
        let mut file = ring_file();
        file.add_key("a different passphrase").unwrap();
        let err = KeyRing::from_file(&file, PASS).unwrap_err();
        assert!(matches!(err, KeyRingError::WrongPassword), "{err}");
    }

    #[test]
    fn save_and_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.json");
        let mut file = ring_file();
        file.add_key(PASS).unwrap();
        file.save(&path).unwrap();

        let ring = KeyRing::open(&path, PASS).unwrap();
        assert_eq!(ring.len(), 2);
    }

// ## 2️⃣ Legacy header

    #[test]
    fn session_key_round_trips_through_header() {
        let file = ring_file();
        let ring = KeyRing::from_file(&file, PASS).unwrap();
        let session = [42u8; 32];

        let header = seal_legacy(&ring.public_keys()[0], &session).unwrap();
        let bytes = header.encode();
        assert_eq!(bytes.len(), LEGACY_HEADER_LEN);
        assert_eq!(&bytes[..4], b"IGLK");

        let decoded = LegacyHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(ring.open_session_key(&decoded).unwrap(), session);
    }

    #[test]
    fn header_for_another_ring_is_wrong_header() {
        let ours = KeyRing::from_file(&ring_file(), PASS).unwrap();
        let theirs = KeyRing::from_file(&ring_file(), PASS).unwrap();
        let header = seal_legacy(&theirs.public_keys()[0], &[1u8; 32]).unwrap();

        let err = ours.open_session_key(&header).unwrap_err();
        assert!(matches!(err, KeyRingError::WrongHeader(_)), "{err}");
        assert!(err.is_user_error());
    }

    #[test]
    fn swapped_ephemeral_key_fails_unwrap() {
        let ring = KeyRing::from_file(&ring_file(), PASS).unwrap();
        let mut header = seal_legacy(&ring.public_keys()[0], &[1u8; 32]).unwrap();
        header.ephemeral[0] ^= 0x40;
        let err = ring.open_session_key(&header).unwrap_err();
        assert!(matches!(err, KeyRingError::WrongHeader(_)), "{err}");
    }

    #[test]
    fn damaged_header_crc_is_malformed() {
        let ring = KeyRing::from_file(&ring_file(), PASS).unwrap();
        let mut bytes = seal_legacy(&ring.public_keys()[0], &[1u8; 32]).unwrap().encode();
        bytes[70] ^= 1;
        let err = LegacyHeader::decode(&bytes).unwrap_err();
        assert!(matches!(err, KeyRingError::MalformedHeader(_)), "{err}");
    }

    #[test]
    fn non_legacy_input_is_reported() {
        let err = LegacyHeader::decode(b"plain text, not an envelope").unwrap_err();
        assert!(matches!(err, KeyRingError::NotLegacy), "{err}");
    }

// ## 3️⃣ Envelope streams

    #[test]
    fn legacy_stream_round_trip() {
        let file = ring_file();
        let ring = KeyRing::from_file(&file, PASS).unwrap();
        let plain: Vec<u8> = (0..200_000u32).map(|i| (i % 7) as u8).collect();

        let mut w = legacy_encrypt(Vec::new(), &ring.public_keys()[0], EncryptOptions::default()).unwrap();
        w.write_all(&plain).unwrap();
        w.finish().unwrap();
        let sealed = w.into_inner();

        let mut out = Vec::new();
        legacy_decrypt(Cursor::new(sealed), &ring).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn legacy_stream_for_other_ring_fails_before_body() {
        let ours = KeyRing::from_file(&ring_file(), PASS).unwrap();
        let theirs = KeyRing::from_file(&ring_file(), PASS).unwrap();
        let mut w = legacy_encrypt(Vec::new(), &theirs.public_keys()[0], EncryptOptions::default()).unwrap();
        w.write_all(b"data").unwrap();
        w.finish().unwrap();

        let err = legacy_decrypt(Cursor::new(w.into_inner()), &ours).err().unwrap();
        assert!(matches!(err, KeyRingError::WrongHeader(_)), "{err}");
    }
}
