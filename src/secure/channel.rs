//! Per-node symmetric channel codec.
//!
//! Vectors are serialized as little-endian `f64` bytes and combined with a
//! 32-byte per-node key repeated cyclically. The XOR stream is reversible but
//! offers no confidentiality or integrity; [`ChannelCodec`] exists so a keyed,
//! authenticated construction can replace it without touching callers.

use crate::core::{Error, Result};
use rand::RngCore;
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Serialized width of one vector element.
pub const ELEMENT_WIDTH: usize = std::mem::size_of::<f64>();

/// Symmetric encode/decode keyed by node identity.
pub trait ChannelCodec: Send + Sync {
    /// Generate (or regenerate) key material for a node.
    fn generate_key(&mut self, node_id: &str);

    /// Whether a key exists for the node.
    fn has_key(&self, node_id: &str) -> bool;

    /// Encode a vector for the node, creating its key on first use.
    fn encrypt(&mut self, vector: &[f64], node_id: &str) -> Vec<u8>;

    /// Decode a ciphertext produced for the node.
    fn decrypt(&self, ciphertext: &[u8], node_id: &str) -> Result<Vec<f64>>;

    /// Decode every ciphertext and return their elementwise mean.
    ///
    /// The i-th ciphertext is decoded with the key of `node_{i}`, whichever
    /// node actually produced it.
    fn aggregate_secure(&self, ciphertexts: &[Vec<u8>]) -> Result<Vec<f64>>;
}

/// Positional node name used by [`ChannelCodec::aggregate_secure`].
pub fn positional_node_id(index: usize) -> String {
    format!("node_{}", index)
}

/// Serialize a vector to little-endian bytes.
pub fn vector_to_bytes(vector: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * ELEMENT_WIDTH);
    for x in vector {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian bytes into a vector.
pub fn bytes_to_vector(bytes: &[u8]) -> Result<Vec<f64>> {
    if bytes.len() % ELEMENT_WIDTH != 0 {
        return Err(Error::MalformedCiphertext {
            len: bytes.len(),
            width: ELEMENT_WIDTH,
        });
    }

    Ok(bytes
        .chunks_exact(ELEMENT_WIDTH)
        .map(|chunk| {
            let mut raw = [0u8; ELEMENT_WIDTH];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// XOR every byte with the key, repeating the key cyclically.
pub fn xor_stream(data: &[u8], key: &[u8; KEY_LEN]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// Short SHA3-256 fingerprint of a key, safe to log.
pub fn key_fingerprint(key: &[u8; KEY_LEN]) -> String {
    let digest = Sha3_256::digest(key);
    hex::encode(&digest[..8])
}

/// Fresh random key for one node.
fn fresh_key(node_id: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    tracing::debug!(
        node_id,
        fingerprint = %key_fingerprint(&key),
        "Generated channel key"
    );
    key
}

/// Toy XOR-stream codec with lazily generated per-node keys.
pub struct XorChannelCodec {
    keys: HashMap<String, [u8; KEY_LEN]>,
}

impl XorChannelCodec {
    /// Create a codec with room for `expected_nodes` keys.
    pub fn new(expected_nodes: usize) -> Self {
        Self {
            keys: HashMap::with_capacity(expected_nodes),
        }
    }

    /// Number of keys generated so far.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Fingerprint of a node's key, if one exists.
    pub fn fingerprint(&self, node_id: &str) -> Option<String> {
        self.keys.get(node_id).map(key_fingerprint)
    }

    fn key(&self, node_id: &str) -> Result<&[u8; KEY_LEN]> {
        self.keys
            .get(node_id)
            .ok_or_else(|| Error::MissingChannelKey(node_id.to_string()))
    }
}

impl ChannelCodec for XorChannelCodec {
    fn generate_key(&mut self, node_id: &str) {
        self.keys.insert(node_id.to_string(), fresh_key(node_id));
    }

    fn has_key(&self, node_id: &str) -> bool {
        self.keys.contains_key(node_id)
    }

    fn encrypt(&mut self, vector: &[f64], node_id: &str) -> Vec<u8> {
        let key = self
            .keys
            .entry(node_id.to_string())
            .or_insert_with(|| fresh_key(node_id));
        xor_stream(&vector_to_bytes(vector), key)
    }

    fn decrypt(&self, ciphertext: &[u8], node_id: &str) -> Result<Vec<f64>> {
        let key = self.key(node_id)?;
        bytes_to_vector(&xor_stream(ciphertext, key))
    }

    fn aggregate_secure(&self, ciphertexts: &[Vec<u8>]) -> Result<Vec<f64>> {
        if ciphertexts.is_empty() {
            return Err(Error::EmptyAggregation);
        }

        let mut total: Option<Vec<f64>> = None;
        for (i, ciphertext) in ciphertexts.iter().enumerate() {
            let vector = self.decrypt(ciphertext, &positional_node_id(i))?;
            match total.as_mut() {
                None => total = Some(vector),
                Some(acc) => {
                    if acc.len() != vector.len() {
                        return Err(Error::DimensionMismatch {
                            expected: acc.len(),
                            actual: vector.len(),
                        });
                    }
                    for (a, x) in acc.iter_mut().zip(vector) {
                        *a += x;
                    }
                }
            }
        }

        let count = ciphertexts.len() as f64;
        let mut mean = total.ok_or(Error::EmptyAggregation)?;
        for m in &mut mean {
            *m /= count;
        }
        Ok(mean)
    }
}
