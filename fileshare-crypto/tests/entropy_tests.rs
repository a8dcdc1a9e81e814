//! Entropy-failure handling for key and IV generation.

use fileshare_crypto::{CryptoError, generate_iv_with, generate_key_with};
use rand::TryRngCore;
use std::io;

/// RNG whose source is permanently unavailable.
struct DeadRng;

impl TryRngCore for DeadRng {
    type Error = io::Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        Err(io::Error::other("getrandom unavailable"))
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        Err(io::Error::other("getrandom unavailable"))
    }

    fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> Result<(), Self::Error> {
        Err(io::Error::other("getrandom unavailable"))
    }
}

/// RNG that yields a fixed byte, for reproducible keys.
struct ConstRng(u8);

impl TryRngCore for ConstRng {
    type Error = io::Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        Ok(u32::from_ne_bytes([self.0; 4]))
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        Ok(u64::from_ne_bytes([self.0; 8]))
    }

    fn try_fill_bytes(&mut self, dst: &mut [u8]) -> Result<(), Self::Error> {
        dst.fill(self.0);
        Ok(())
    }
}

#[test]
fn key_generation_surfaces_entropy_error() {
    let err = generate_key_with(&mut DeadRng).unwrap_err();
    match err {
        CryptoError::Entropy(msg) => assert!(msg.contains("getrandom unavailable")),
        other => panic!("expected Entropy, got: {other:?}"),
    }
}

#[test]
fn iv_generation_surfaces_entropy_error() {
    let err = generate_iv_with(&mut DeadRng).unwrap_err();
    assert!(matches!(err, CryptoError::Entropy(_)));
}

#[test]
fn key_generation_uses_supplied_rng() {
    let key = generate_key_with(&mut ConstRng(0x5A)).unwrap();
    assert_eq!(key.as_bytes(), &[0x5A; 32]);

    let iv = generate_iv_with(&mut ConstRng(0x07)).unwrap();
    assert_eq!(iv.as_bytes(), &[0x07; 16]);
}
