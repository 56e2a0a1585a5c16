// Copyright (c) 2024 Botho Foundation

//! Layered cipher for route establishment and steady-state traffic.
//!
//! # Establishment envelopes
//!
//! Built innermost first. Each hop receives exactly
//! `establish_envelope_size` bytes:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────┐
//! │ ephemeral 32 │ AES-256-CTR( layer key )                             │
//! └──────────────┴──────────────────────────────────────────────────────┘
//!   relay plaintext:    [0x01][next hop address][next layer ...]
//!   boundary plaintext: [0x00][len u32][sha256(len ‖ payload)][payload][pad]
//! ```
//!
//! A relay strips its layer, then re-pads the inner envelope with fresh
//! random bytes so every hop sees the same size.
//!
//! # Routed envelopes
//!
//! Every steady-state envelope is `routed_envelope_size` bytes:
//! `[iv 16][body]`, body plaintext `[seq u64][len u32][sha256][object][pad]`.
//! A hop's layer is one AES-256-CTR pass over the body under its stream key
//! followed by replacing the IV with `AES-256(iv key, iv)`. The same
//! operation peels a layer on the way out and adds one on the way in; the
//! start point precomputes the outbound IV chain and inverts the inbound
//! one.

use super::config::CipherParams;
use super::keys::{self, IdentityKeyPair};
use super::types::HopKey;
use aes::cipher::{
    generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher,
};
use aes::Aes256;
use ctr::Ctr64BE;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use umbra_wire::{NodeKey, PeerAddr, RelayHandle, MAX_COMPACT_ADDR_LEN};
use x25519_dalek::{EphemeralSecret, PublicKey};

type Aes256Ctr = Ctr64BE<Aes256>;

/// Length of the ephemeral public key at the front of every layer.
pub const EPHEMERAL_KEY_LEN: usize = 32;

/// Length of the integrity hash.
pub const HASH_LEN: usize = 32;

/// Length of the IV at the front of a routed envelope.
pub const ROUTED_IV_LEN: usize = 16;

/// Sequence, length and hash ahead of a routed object.
pub const ROUTED_HEADER_LEN: usize = 8 + 4 + HASH_LEN;

/// Bytes the boundary layer adds around the payload.
pub const BOUNDARY_LAYER_OVERHEAD: usize = EPHEMERAL_KEY_LEN + 1 + 4 + HASH_LEN;

/// Worst-case bytes a relay layer adds.
pub const RELAY_LAYER_OVERHEAD: usize = EPHEMERAL_KEY_LEN + 1 + MAX_COMPACT_ADDR_LEN;

const FLAG_BOUNDARY: u8 = 0;
const FLAG_RELAY: u8 = 1;

/// Errors from building or opening envelopes.
///
/// Every opening error means the message is dropped without a reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("route has no hops")]
    EmptyChain,

    #[error("payload of {size} bytes exceeds capacity of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("envelope is {actual} bytes, expected {expected}")]
    WrongSize { expected: usize, actual: usize },

    #[error("ephemeral key produced a non-contributory secret")]
    WeakKey,

    #[error("unknown layer flag {0}")]
    UnknownLayerFlag(u8),

    #[error("declared length {declared} exceeds {available} available bytes")]
    BadLength { declared: usize, available: usize },

    #[error("integrity hash mismatch")]
    IntegrityMismatch,

    #[error("malformed next hop address")]
    BadAddress,
}

/// Output of [`build_envelope`].
#[derive(Debug)]
pub struct BuiltEnvelope {
    /// Envelope for the first hop
    pub envelope: Vec<u8>,
    /// One key per hop, first hop first, boundary last
    pub hop_keys: Vec<HopKey>,
}

/// What a hop learns from opening its layer.
#[derive(Debug)]
pub enum Opened {
    /// Forward `envelope` to `next_hop`.
    Relay {
        key: HopKey,
        next_hop: PeerAddr,
        envelope: Vec<u8>,
    },
    /// This hop is the boundary.
    Boundary { key: HopKey, payload: Vec<u8> },
}

// ============================================================================
// Primitives
// ============================================================================

fn apply_ctr(key: &[u8; 32], iv: &[u8], buf: &mut [u8]) {
    let mut cipher = Aes256Ctr::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    cipher.apply_keystream(buf);
}

fn encrypt_iv(key: &[u8; 32], iv: &mut [u8; ROUTED_IV_LEN]) {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut block = aes::Block::clone_from_slice(&iv[..]);
    cipher.encrypt_block(&mut block);
    iv.copy_from_slice(&block);
}

fn decrypt_iv(key: &[u8; 32], iv: &mut [u8; ROUTED_IV_LEN]) {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut block = aes::Block::clone_from_slice(&iv[..]);
    cipher.decrypt_block(&mut block);
    iv.copy_from_slice(&block);
}

fn integrity_hash(parts: &[&[u8]]) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn pad_random<R: RngCore>(buf: &mut Vec<u8>, target: usize, rng: &mut R) {
    let start = buf.len();
    if start < target {
        buf.resize(target, 0);
        rng.fill_bytes(&mut buf[start..]);
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(arr)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(arr)
}

// ============================================================================
// Establishment
// ============================================================================

/// Encrypt `plaintext` to `hop` under a fresh ephemeral key.
fn seal_layer<R: RngCore + CryptoRng>(
    hop: &NodeKey,
    mut plaintext: Vec<u8>,
    rng: &mut R,
) -> (Vec<u8>, HopKey) {
    let ephemeral = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&keys::public_key(hop));

    let layer_key = keys::derive_layer_key(&shared);
    apply_ctr(&layer_key.key, &layer_key.iv, &mut plaintext);

    let mut sealed = Vec::with_capacity(EPHEMERAL_KEY_LEN + plaintext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&plaintext);
    (sealed, keys::derive_hop_key(&shared))
}

/// Build an establishment envelope through `chain`.
///
/// The last handle in `chain` is the boundary; any handles before it are
/// relays. Returns the envelope for `chain[0]` and every hop's key.
pub fn build_envelope(
    chain: &[RelayHandle],
    payload: &[u8],
    params: &CipherParams,
) -> Result<BuiltEnvelope, CipherError> {
    let (boundary, _) = chain.split_last().ok_or(CipherError::EmptyChain)?;
    let size = params.establish_envelope_size;

    // Each relay layer names the hop after it.
    let relay_overhead: usize = chain
        .windows(2)
        .map(|pair| EPHEMERAL_KEY_LEN + 1 + pair[1].addr.compact_len())
        .sum();
    let max = size.saturating_sub(relay_overhead + BOUNDARY_LAYER_OVERHEAD);
    if payload.len() > max {
        return Err(CipherError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    let boundary_size = size - relay_overhead;

    let mut rng = rand::thread_rng();
    let mut hop_keys = Vec::with_capacity(chain.len());

    let len = (payload.len() as u32).to_le_bytes();
    let mut plaintext = Vec::with_capacity(boundary_size - EPHEMERAL_KEY_LEN);
    plaintext.push(FLAG_BOUNDARY);
    plaintext.extend_from_slice(&len);
    plaintext.extend_from_slice(&integrity_hash(&[&len, payload]));
    plaintext.extend_from_slice(payload);
    pad_random(&mut plaintext, boundary_size - EPHEMERAL_KEY_LEN, &mut rng);

    let (mut layer, key) = seal_layer(&boundary.key, plaintext, &mut rng);
    hop_keys.push(key);

    for index in (0..chain.len() - 1).rev() {
        let next = &chain[index + 1];
        let mut plaintext = Vec::with_capacity(1 + next.addr.compact_len() + layer.len());
        plaintext.push(FLAG_RELAY);
        next.addr.encode_compact(&mut plaintext);
        plaintext.extend_from_slice(&layer);

        let (sealed, key) = seal_layer(&chain[index].key, plaintext, &mut rng);
        layer = sealed;
        hop_keys.push(key);
    }
    hop_keys.reverse();
    debug_assert_eq!(layer.len(), size);

    Ok(BuiltEnvelope {
        envelope: layer,
        hop_keys,
    })
}

/// Open one establishment layer with this hop's identity.
pub fn open_envelope(
    identity: &IdentityKeyPair,
    envelope: &[u8],
    params: &CipherParams,
) -> Result<Opened, CipherError> {
    let size = params.establish_envelope_size;
    if envelope.len() != size || size <= EPHEMERAL_KEY_LEN {
        return Err(CipherError::WrongSize {
            expected: size,
            actual: envelope.len(),
        });
    }

    let mut ephemeral = [0u8; EPHEMERAL_KEY_LEN];
    ephemeral.copy_from_slice(&envelope[..EPHEMERAL_KEY_LEN]);
    let shared = identity.agree(&PublicKey::from(ephemeral));
    if !shared.was_contributory() {
        return Err(CipherError::WeakKey);
    }

    let layer_key = keys::derive_layer_key(&shared);
    let mut plaintext = envelope[EPHEMERAL_KEY_LEN..].to_vec();
    apply_ctr(&layer_key.key, &layer_key.iv, &mut plaintext);
    let key = keys::derive_hop_key(&shared);

    match plaintext[0] {
        FLAG_BOUNDARY => {
            let body = &plaintext[1..];
            let header = 4 + HASH_LEN;
            if body.len() < header {
                return Err(CipherError::BadLength {
                    declared: header,
                    available: body.len(),
                });
            }
            let declared = read_u32(body) as usize;
            let available = body.len() - header;
            if declared > available {
                return Err(CipherError::BadLength {
                    declared,
                    available,
                });
            }
            let payload = &body[header..header + declared];
            if integrity_hash(&[&body[..4], payload])[..] != body[4..header] {
                return Err(CipherError::IntegrityMismatch);
            }
            Ok(Opened::Boundary {
                key,
                payload: payload.to_vec(),
            })
        }
        FLAG_RELAY => {
            let (next_hop, used) =
                PeerAddr::decode_compact(&plaintext[1..]).map_err(|_| CipherError::BadAddress)?;
            let mut inner = plaintext[1 + used..].to_vec();
            pad_random(&mut inner, size, &mut rand::thread_rng());
            Ok(Opened::Relay {
                key,
                next_hop,
                envelope: inner,
            })
        }
        other => Err(CipherError::UnknownLayerFlag(other)),
    }
}

// ============================================================================
// Steady state
// ============================================================================

/// Lay out a plaintext routed envelope under a random IV.
fn seal_routed(
    sequence: u64,
    object: &[u8],
    params: &CipherParams,
) -> Result<Vec<u8>, CipherError> {
    let max = params.max_routed_object();
    if object.len() > max {
        return Err(CipherError::PayloadTooLarge {
            size: object.len(),
            max,
        });
    }

    let mut rng = rand::thread_rng();
    let seq = sequence.to_le_bytes();
    let len = (object.len() as u32).to_le_bytes();

    let mut packet = vec![0u8; ROUTED_IV_LEN];
    rng.fill_bytes(&mut packet);
    packet.extend_from_slice(&seq);
    packet.extend_from_slice(&len);
    packet.extend_from_slice(&integrity_hash(&[&seq, &len, object]));
    packet.extend_from_slice(object);
    pad_random(&mut packet, params.routed_envelope_size, &mut rng);
    Ok(packet)
}

/// Read a routed envelope whose body is plaintext.
fn open_routed(packet: &[u8]) -> Result<(u64, Vec<u8>), CipherError> {
    let body = &packet[ROUTED_IV_LEN..];
    if body.len() < ROUTED_HEADER_LEN {
        return Err(CipherError::BadLength {
            declared: ROUTED_HEADER_LEN,
            available: body.len(),
        });
    }
    let sequence = read_u64(body);
    let declared = read_u32(&body[8..]) as usize;
    let available = body.len() - ROUTED_HEADER_LEN;
    if declared > available {
        return Err(CipherError::BadLength {
            declared,
            available,
        });
    }
    let object = &body[ROUTED_HEADER_LEN..ROUTED_HEADER_LEN + declared];
    if integrity_hash(&[&body[..8], &body[8..12], object])[..] != body[12..ROUTED_HEADER_LEN] {
        return Err(CipherError::IntegrityMismatch);
    }
    Ok((sequence, object.to_vec()))
}

fn check_routed_size(packet: &[u8], params: &CipherParams) -> Result<(), CipherError> {
    if packet.len() != params.routed_envelope_size || packet.len() < ROUTED_IV_LEN {
        return Err(CipherError::WrongSize {
            expected: params.routed_envelope_size,
            actual: packet.len(),
        });
    }
    Ok(())
}

fn split_iv(packet: &mut [u8]) -> ([u8; ROUTED_IV_LEN], &mut [u8]) {
    let (slot, body) = packet.split_at_mut(ROUTED_IV_LEN);
    let mut iv = [0u8; ROUTED_IV_LEN];
    iv.copy_from_slice(slot);
    (iv, body)
}

/// Apply one hop's layer in place.
///
/// Relays call this in both directions; it removes a layer on outbound
/// traffic and adds one on inbound traffic.
pub fn apply_hop_layer(
    key: &HopKey,
    packet: &mut [u8],
    params: &CipherParams,
) -> Result<(), CipherError> {
    check_routed_size(packet, params)?;
    let (mut iv, body) = split_iv(packet);
    apply_ctr(key.stream_key(), &iv, body);
    encrypt_iv(key.iv_key(), &mut iv);
    packet[..ROUTED_IV_LEN].copy_from_slice(&iv);
    Ok(())
}

/// Start point: encrypt an object for the whole route, first hop first.
pub fn wrap_outbound(
    keys: &[HopKey],
    sequence: u64,
    object: &[u8],
    params: &CipherParams,
) -> Result<Vec<u8>, CipherError> {
    if keys.is_empty() {
        return Err(CipherError::EmptyChain);
    }
    let mut packet = seal_routed(sequence, object, params)?;
    let (mut iv, body) = split_iv(&mut packet);
    for key in keys {
        apply_ctr(key.stream_key(), &iv, body);
        encrypt_iv(key.iv_key(), &mut iv);
    }
    Ok(packet)
}

/// Start point: strip every layer from an inbound envelope.
pub fn unwrap_inbound(
    keys: &[HopKey],
    mut packet: Vec<u8>,
    params: &CipherParams,
) -> Result<(u64, Vec<u8>), CipherError> {
    check_routed_size(&packet, params)?;
    let (mut iv, body) = split_iv(&mut packet);
    for key in keys {
        decrypt_iv(key.iv_key(), &mut iv);
        apply_ctr(key.stream_key(), &iv, body);
    }
    open_routed(&packet)
}

/// Boundary: encrypt an object heading back toward the start point.
pub fn wrap_terminal(
    key: &HopKey,
    sequence: u64,
    object: &[u8],
    params: &CipherParams,
) -> Result<Vec<u8>, CipherError> {
    let mut packet = seal_routed(sequence, object, params)?;
    apply_hop_layer(key, &mut packet, params)?;
    Ok(packet)
}

/// Boundary: strip the final layer from an outbound envelope.
pub fn unwrap_terminal(
    key: &HopKey,
    mut packet: Vec<u8>,
    params: &CipherParams,
) -> Result<(u64, Vec<u8>), CipherError> {
    apply_hop_layer(key, &mut packet, params)?;
    open_routed(&packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn hops(count: usize, seed: u64) -> (Vec<IdentityKeyPair>, Vec<RelayHandle>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let identities: Vec<_> = (0..count)
            .map(|_| IdentityKeyPair::generate(&mut rng))
            .collect();
        let handles = identities
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let addr: PeerAddr = format!("10.0.0.{}:7200", i + 1).parse().unwrap();
                RelayHandle::new(addr, id.node_key())
            })
            .collect();
        (identities, handles)
    }

    /// Open a built envelope hop by hop, returning each hop's key and the
    /// boundary payload.
    fn walk(
        identities: &[IdentityKeyPair],
        handles: &[RelayHandle],
        envelope: Vec<u8>,
        params: &CipherParams,
    ) -> (Vec<HopKey>, Vec<u8>) {
        let mut keys = Vec::new();
        let mut current = envelope;
        for (i, identity) in identities.iter().enumerate() {
            assert_eq!(current.len(), params.establish_envelope_size);
            match open_envelope(identity, &current, params).unwrap() {
                Opened::Relay {
                    key,
                    next_hop,
                    envelope,
                } => {
                    assert_eq!(next_hop, handles[i + 1].addr);
                    keys.push(key);
                    current = envelope;
                }
                Opened::Boundary { key, payload } => {
                    assert_eq!(i, identities.len() - 1);
                    keys.push(key);
                    return (keys, payload);
                }
            }
        }
        panic!("envelope never reached a boundary");
    }

    #[test]
    fn test_establish_roundtrip_through_zero_to_three_relays() {
        let params = CipherParams::default();
        let payload = b"route establishment body".to_vec();

        for relays in 0..=3 {
            let (identities, handles) = hops(relays + 1, relays as u64);
            let built = build_envelope(&handles, &payload, &params).unwrap();
            assert_eq!(built.envelope.len(), params.establish_envelope_size);
            assert_eq!(built.hop_keys.len(), relays + 1);

            let (keys, opened) = walk(&identities, &handles, built.envelope, &params);
            assert_eq!(opened, payload);
            assert_eq!(keys, built.hop_keys);
        }
    }

    #[test]
    fn test_relays_never_see_payload() {
        let params = CipherParams::default();
        let payload = b"only-the-boundary-reads-this-sentence".to_vec();
        let (identities, handles) = hops(3, 11);
        let built = build_envelope(&handles, &payload, &params).unwrap();

        let mut current = built.envelope;
        for identity in &identities[..2] {
            match open_envelope(identity, &current, &params).unwrap() {
                Opened::Relay { envelope, .. } => {
                    assert!(!envelope.windows(payload.len()).any(|w| w == payload));
                    current = envelope;
                }
                Opened::Boundary { .. } => panic!("relay opened as boundary"),
            }
        }
    }

    #[test]
    fn test_fixed_size_independent_of_chain_and_payload() {
        let params = CipherParams::default();
        for relays in 0..=3 {
            for len in [0usize, 1, 20] {
                let (_, handles) = hops(relays + 1, 40 + relays as u64);
                let built = build_envelope(&handles, &vec![7u8; len], &params).unwrap();
                assert_eq!(built.envelope.len(), params.establish_envelope_size);
            }
        }
    }

    #[test]
    fn test_payload_too_large() {
        let params = CipherParams::default();
        let (_, handles) = hops(4, 3);
        let max = params.max_establish_payload(3);
        let result = build_envelope(&handles, &vec![0u8; max + 1], &params);
        assert!(matches!(result, Err(CipherError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_empty_chain() {
        let result = build_envelope(&[], b"x", &CipherParams::default());
        assert!(matches!(result, Err(CipherError::EmptyChain)));
    }

    #[test]
    fn test_tampered_boundary_layer_fails_integrity() {
        let params = CipherParams::default();
        let (identities, handles) = hops(1, 5);
        let mut envelope = build_envelope(&handles, b"hello", &params)
            .unwrap()
            .envelope;

        // First payload byte sits right after the flag, length and hash.
        envelope[EPHEMERAL_KEY_LEN + 1 + 4 + HASH_LEN] ^= 0x01;
        let result = open_envelope(&identities[0], &envelope, &params);
        assert!(matches!(result, Err(CipherError::IntegrityMismatch)));
    }

    #[test]
    fn test_wrong_identity_cannot_open_boundary() {
        let params = CipherParams::default();
        let (_, handles) = hops(1, 6);
        let (strangers, _) = hops(1, 99);
        let envelope = build_envelope(&handles, b"secret", &params)
            .unwrap()
            .envelope;
        let result = open_envelope(&strangers[0], &envelope, &params);
        assert!(!matches!(result, Ok(Opened::Boundary { .. })));
    }

    #[test]
    fn test_wrong_size_rejected() {
        let params = CipherParams::default();
        let (identities, _) = hops(1, 7);
        let result = open_envelope(&identities[0], &[0u8; 100], &params);
        assert_eq!(
            result.unwrap_err(),
            CipherError::WrongSize {
                expected: params.establish_envelope_size,
                actual: 100
            }
        );
    }

    #[test]
    fn test_routed_outbound_and_inbound_through_relays() {
        let params = CipherParams::default();
        let (identities, handles) = hops(4, 21);
        let built = build_envelope(&handles, b"", &params).unwrap();
        let (hop_keys, _) = walk(&identities, &handles, built.envelope, &params);
        let start_keys = built.hop_keys;
        let (relay_keys, boundary_key) = hop_keys.split_at(3);
        let boundary_key = &boundary_key[0];

        let object = b"steady state object".to_vec();
        let mut packet = wrap_outbound(&start_keys, 5, &object, &params).unwrap();
        for key in relay_keys {
            let before = packet[..ROUTED_IV_LEN].to_vec();
            apply_hop_layer(key, &mut packet, &params).unwrap();
            assert_eq!(packet.len(), params.routed_envelope_size);
            assert_ne!(packet[..ROUTED_IV_LEN], before[..]);
        }
        let (seq, opened) = unwrap_terminal(boundary_key, packet, &params).unwrap();
        assert_eq!((seq, opened), (5, object.clone()));

        let mut packet = wrap_terminal(boundary_key, 9, &object, &params).unwrap();
        for key in relay_keys.iter().rev() {
            apply_hop_layer(key, &mut packet, &params).unwrap();
        }
        let (seq, opened) = unwrap_inbound(&start_keys, packet, &params).unwrap();
        assert_eq!((seq, opened), (9, object));
    }

    #[test]
    fn test_routed_direct_to_boundary() {
        let params = CipherParams::default();
        let (identities, handles) = hops(1, 22);
        let built = build_envelope(&handles, b"", &params).unwrap();
        let (hop_keys, _) = walk(&identities, &handles, built.envelope, &params);

        let packet = wrap_outbound(&built.hop_keys, 1, b"ping", &params).unwrap();
        let (seq, object) = unwrap_terminal(&hop_keys[0], packet, &params).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(object, b"ping");
    }

    #[test]
    fn test_routed_missing_layer_fails() {
        let params = CipherParams::default();
        let (identities, handles) = hops(2, 23);
        let built = build_envelope(&handles, b"", &params).unwrap();
        let (hop_keys, _) = walk(&identities, &handles, built.envelope, &params);

        // Skip the relay's layer.
        let packet = wrap_outbound(&built.hop_keys, 1, b"data", &params).unwrap();
        assert!(unwrap_terminal(&hop_keys[1], packet, &params).is_err());
    }

    #[test]
    fn test_routed_object_too_large() {
        let params = CipherParams::default();
        let (_, handles) = hops(1, 24);
        let built = build_envelope(&handles, b"", &params).unwrap();
        let object = vec![0u8; params.max_routed_object() + 1];
        let result = wrap_outbound(&built.hop_keys, 1, &object, &params);
        assert!(matches!(result, Err(CipherError::PayloadTooLarge { .. })));

        let object = vec![0u8; params.max_routed_object()];
        let packet = wrap_outbound(&built.hop_keys, 1, &object, &params).unwrap();
        assert_eq!(packet.len(), params.routed_envelope_size);
    }
}
