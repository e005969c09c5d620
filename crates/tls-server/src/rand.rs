//! The single place where we generate random material for our own use.

use rand::{rngs::OsRng, RngCore};

/// Fill the whole slice with random material.
pub(crate) fn fill_random(bytes: &mut [u8]) -> Result<(), GetRandomFailed> {
    OsRng.try_fill_bytes(bytes).map_err(|_| GetRandomFailed)
}

/// Make a Vec<u8> of the given size containing random material.
pub(crate) fn random_vec(len: usize) -> Result<Vec<u8>, GetRandomFailed> {
    let mut v = vec![0; len];
    fill_random(&mut v)?;
    Ok(v)
}

#[derive(Debug)]
pub struct GetRandomFailed;

impl From<GetRandomFailed> for tls_core::Error {
    fn from(_: GetRandomFailed) -> Self {
        Self::FailedToGetRandomBytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_requested_length() {
        let v = random_vec(48).unwrap();
        assert_eq!(v.len(), 48);
        // Not all zero, with overwhelming probability.
        assert!(v.iter().any(|&b| b != 0));
    }
}
