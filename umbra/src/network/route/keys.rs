// Copyright (c) 2024 Botho Foundation

//! Identity keys and per-hop key derivation.
//!
//! Every establishment layer is sealed to one hop with a fresh ephemeral
//! X25519 key. The shared secret feeds two independent HKDF-SHA256
//! expansions:
//!
//! ```text
//! shared ─┬─ HKDF(info = "umbra-establish-v1") ─▶ layer key + CTR IV
//!         └─ HKDF(info = "umbra-route-v1")     ─▶ HopKey (stream key, IV key)
//! ```
//!
//! The layer key only ever encrypts the establishment envelope; the
//! [`HopKey`] protects steady-state traffic.

use super::types::{HopKey, HOP_KEY_MATERIAL_LEN};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use std::fmt;
use umbra_wire::NodeKey;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Salt shared by every derivation.
const HKDF_SALT: &[u8] = b"umbra-mcr-salt";

/// Domain for the establishment layer cipher.
const ESTABLISH_DOMAIN: &[u8] = b"umbra-establish-v1";

/// Domain for the steady-state hop key.
const ROUTE_DOMAIN: &[u8] = b"umbra-route-v1";

/// Length of the establishment layer key.
pub const LAYER_KEY_LEN: usize = 32;

/// Length of the establishment layer CTR IV.
pub const LAYER_IV_LEN: usize = 16;

/// An X25519 key pair whose public half is a routable identifier.
///
/// Nodes use one for opening establishment layers; logical endpoints own
/// their own.
#[derive(Clone)]
pub struct IdentityKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl IdentityKeyPair {
    /// Generate a fresh key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rng))
    }

    /// Rebuild a key pair from stored secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Secret bytes for persisting; wiped when the wrapper drops.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// The public key as a routable identifier.
    pub fn node_key(&self) -> NodeKey {
        NodeKey(self.public.to_bytes())
    }

    pub(crate) fn agree(&self, peer: &PublicKey) -> SharedSecret {
        self.secret.diffie_hellman(peer)
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKeyPair({})", self.node_key())
    }
}

/// Key and IV for one establishment layer.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct LayerKey {
    pub key: [u8; LAYER_KEY_LEN],
    pub iv: [u8; LAYER_IV_LEN],
}

fn expand(shared: &[u8], domain: &[u8], out: &mut [u8]) {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared);
    // Output lengths here are far below the 255 * HashLen limit.
    hk.expand(domain, out)
        .expect("HKDF output length is within bounds");
}

/// Derive the establishment layer cipher from a shared secret.
pub(crate) fn derive_layer_key(shared: &SharedSecret) -> LayerKey {
    let mut okm = Zeroizing::new([0u8; LAYER_KEY_LEN + LAYER_IV_LEN]);
    expand(shared.as_bytes(), ESTABLISH_DOMAIN, &mut okm[..]);

    let mut key = [0u8; LAYER_KEY_LEN];
    let mut iv = [0u8; LAYER_IV_LEN];
    key.copy_from_slice(&okm[..LAYER_KEY_LEN]);
    iv.copy_from_slice(&okm[LAYER_KEY_LEN..]);
    LayerKey { key, iv }
}

/// Derive the steady-state hop key from a shared secret.
pub(crate) fn derive_hop_key(shared: &SharedSecret) -> HopKey {
    let mut okm = Zeroizing::new([0u8; HOP_KEY_MATERIAL_LEN]);
    expand(shared.as_bytes(), ROUTE_DOMAIN, &mut okm[..]);
    HopKey::from_material(&okm)
}

/// Convert a node key into an X25519 public key.
pub(crate) fn public_key(key: &NodeKey) -> PublicKey {
    PublicKey::from(*key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_identity_roundtrip_through_secret_bytes() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let identity = IdentityKeyPair::generate(&mut rng);
        let restored = IdentityKeyPair::from_secret_bytes(*identity.secret_bytes());
        assert_eq!(identity.node_key(), restored.node_key());
    }

    #[test]
    fn test_both_sides_derive_same_hop_key() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let alice = IdentityKeyPair::generate(&mut rng);
        let bob = IdentityKeyPair::generate(&mut rng);

        let a = alice.agree(&public_key(&bob.node_key()));
        let b = bob.agree(&public_key(&alice.node_key()));

        assert_eq!(derive_hop_key(&a), derive_hop_key(&b));
        assert_eq!(derive_layer_key(&a).key, derive_layer_key(&b).key);
    }

    #[test]
    fn test_domains_are_separated() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let alice = IdentityKeyPair::generate(&mut rng);
        let bob = IdentityKeyPair::generate(&mut rng);
        let shared = alice.agree(&public_key(&bob.node_key()));

        let layer = derive_layer_key(&shared);
        let hop = derive_hop_key(&shared);
        assert_ne!(&layer.key, hop.stream_key());
        assert_ne!(&layer.key, hop.iv_key());
    }

    #[test]
    fn test_identity_debug_shows_public_key_only() {
        let identity = IdentityKeyPair::from_secret_bytes([5u8; 32]);
        let debug = format!("{:?}", identity);
        assert_eq!(debug, format!("IdentityKeyPair({})", identity.node_key()));
    }
}
