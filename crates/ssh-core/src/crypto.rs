use russh::{
    Preferred,
    keys::{Algorithm, HashAlg},
};
use std::borrow::Cow;

pub fn default_preferred() -> Preferred {
    Preferred::DEFAULT.clone()
}

/// Algorithm preferences for old targets that only speak SHA1 kex and CBC ciphers.
pub fn legacy_preferred() -> Preferred {
    Preferred {
        kex: Cow::Owned(vec![russh::kex::CURVE25519, russh::kex::DH_G14_SHA1, russh::kex::DH_G1_SHA1]),
        key: Cow::Owned(vec![
            Algorithm::Ed25519,
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha256),
            },
            Algorithm::Rsa { hash: None },
            Algorithm::Dsa,
        ]),
        cipher: Cow::Owned(vec![
            russh::cipher::CHACHA20_POLY1305,
            russh::cipher::AES_128_CTR,
            russh::cipher::AES_128_CBC,
            russh::cipher::AES_256_CBC,
        ]),
        mac: Cow::Owned(vec![russh::mac::HMAC_SHA256, russh::mac::HMAC_SHA512, russh::mac::HMAC_SHA1]),
        compression: Preferred::DEFAULT.compression,
    }
}

/// Pick the preference set for an outbound connection.
pub fn preferred_for(legacy: bool) -> Preferred {
    if legacy { legacy_preferred() } else { default_preferred() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_set_adds_cbc_and_sha1_kex() {
        let legacy = preferred_for(true);
        assert!(legacy.cipher.contains(&russh::cipher::AES_128_CBC));
        assert!(legacy.kex.contains(&russh::kex::DH_G14_SHA1));
        assert!(legacy.cipher.iter().all(|cipher| cipher.as_ref() != "3des-cbc"));

        let modern = preferred_for(false);
        assert!(!modern.cipher.contains(&russh::cipher::AES_128_CBC));
    }
}
