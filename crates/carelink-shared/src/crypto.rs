//! Message payload encryption.
//!
//! The provider prefers AES-256-GCM (96-bit IV, 128-bit tag) and degrades to
//! a XOR keystream over a PRNG-seeded string key when a native AEAD is ruled
//! out at runtime. The XOR path offers no real confidentiality; it exists so
//! the system degrades to "working but insecure" instead of non-functional,
//! and selecting it is logged as a security event.
//!
//! Crypto failures never propagate: a failed encryption returns the message
//! as an `encrypted: false` passthrough, and a failed decryption returns a
//! placeholder that keeps the routing metadata but redacts the body.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::constants::{AES_IV_SIZE, AES_KEY_SIZE, DECRYPT_FAILURE_TEXT, XOR_KEY_LEN};
use crate::types::{ChatMessage, MessageKind};

/// Cipher used for a given envelope, so the receiver knows which
/// decryption path to take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CipherMethod {
    #[serde(rename = "AES-GCM")]
    AesGcm,
    #[serde(rename = "XOR")]
    Xor,
}

/// Transport envelope for a chat message. Routing metadata stays in
/// cleartext; only the serialized message body is opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub id: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// `false` marks a passthrough after an encryption failure; the
    /// transport layer should warn but still deliver.
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<CipherMethod>,
    /// Base64 ciphertext when `encrypted`, the plaintext body otherwise.
    pub payload: String,
}

/// Pure status read, safe to expose in UI.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EncryptionInfo {
    pub active: bool,
    pub method: Option<CipherMethod>,
    pub secure: bool,
    pub hipaa_compliant: bool,
    pub native_support: bool,
}

enum SessionKeys {
    Aes {
        key: [u8; AES_KEY_SIZE],
        iv: [u8; AES_IV_SIZE],
    },
    Xor {
        key: Vec<u8>,
        iv: Vec<u8>,
    },
}

/// Per-session symmetric key material. Keys are generated lazily on first
/// use, never serialized, never transmitted.
pub struct EncryptionProvider {
    force_fallback: bool,
    keys: Option<SessionKeys>,
}

impl EncryptionProvider {
    /// Provider using the native AES-256-GCM path.
    pub fn new() -> Self {
        Self {
            force_fallback: false,
            keys: None,
        }
    }

    /// Provider pinned to the XOR fallback, for platforms where the AEAD
    /// path has been ruled out (and for exercising the degraded path in
    /// tests).
    pub fn with_fallback() -> Self {
        Self {
            force_fallback: true,
            keys: None,
        }
    }

    /// (Re)generate the session key and IV. Always regenerates; callers
    /// control when a fresh session starts.
    pub fn generate_session_keys(&mut self) -> bool {
        if self.force_fallback {
            tracing::warn!(
                method = "XOR",
                "native AEAD unavailable; falling back to keystream cipher (NOT HIPAA compliant)"
            );
            self.keys = Some(SessionKeys::Xor {
                key: random_ascii_key(XOR_KEY_LEN),
                iv: random_ascii_key(AES_IV_SIZE),
            });
        } else {
            let mut key = [0u8; AES_KEY_SIZE];
            let mut iv = [0u8; AES_IV_SIZE];
            rand::rngs::OsRng.fill_bytes(&mut key);
            rand::rngs::OsRng.fill_bytes(&mut iv);
            self.keys = Some(SessionKeys::Aes { key, iv });
        }
        true
    }

    /// Encrypt a message into a transport envelope.
    ///
    /// On any failure the original message is returned as an
    /// `encrypted: false` passthrough instead of an error.
    pub fn encrypt_message(&mut self, msg: &ChatMessage) -> EncryptedEnvelope {
        if self.keys.is_none() {
            self.generate_session_keys();
        }

        let plaintext = match serde_json::to_vec(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, msg_id = %msg.id, "message serialization failed; sending unencrypted");
                return passthrough(msg);
            }
        };

        match self.keys.as_ref() {
            Some(SessionKeys::Aes { key, iv }) => {
                let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
                match cipher.encrypt(Nonce::from_slice(iv), plaintext.as_ref()) {
                    Ok(ciphertext) => envelope(msg, CipherMethod::AesGcm, BASE64.encode(ciphertext)),
                    Err(_) => {
                        tracing::warn!(msg_id = %msg.id, "AES-GCM encryption failed; sending unencrypted");
                        passthrough(msg)
                    }
                }
            }
            Some(SessionKeys::Xor { key, iv }) => {
                let ciphertext = xor_keystream(&plaintext, key, iv);
                envelope(msg, CipherMethod::Xor, BASE64.encode(ciphertext))
            }
            None => passthrough(msg),
        }
    }

    /// Decrypt a transport envelope back into a message.
    ///
    /// Dispatches on the envelope's method tag. On any failure a
    /// placeholder with the original routing metadata is returned; partial
    /// plaintext is never leaked.
    pub fn decrypt_message(&self, env: &EncryptedEnvelope) -> ChatMessage {
        if !env.encrypted {
            return ChatMessage {
                id: env.id.clone(),
                sender: env.sender.clone(),
                recipient: env.recipient.clone(),
                channel: env.channel.clone(),
                timestamp: env.timestamp,
                kind: env.kind,
                text: env.payload.clone(),
            };
        }

        let Ok(ciphertext) = BASE64.decode(&env.payload) else {
            return redacted(env);
        };

        let plaintext = match (env.method, self.keys.as_ref()) {
            (Some(CipherMethod::AesGcm), Some(SessionKeys::Aes { key, iv })) => {
                let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
                match cipher.decrypt(Nonce::from_slice(iv), ciphertext.as_ref()) {
                    Ok(p) => p,
                    Err(_) => return redacted(env),
                }
            }
            (Some(CipherMethod::Xor), Some(SessionKeys::Xor { key, iv })) => {
                xor_keystream(&ciphertext, key, iv)
            }
            _ => return redacted(env),
        };

        match serde_json::from_slice::<ChatMessage>(&plaintext) {
            Ok(msg) => msg,
            Err(_) => redacted(env),
        }
    }

    /// Current encryption status.
    pub fn encryption_info(&self) -> EncryptionInfo {
        let method = match self.keys {
            Some(SessionKeys::Aes { .. }) => Some(CipherMethod::AesGcm),
            Some(SessionKeys::Xor { .. }) => Some(CipherMethod::Xor),
            None => None,
        };
        let secure = matches!(method, Some(CipherMethod::AesGcm));
        EncryptionInfo {
            active: method.is_some(),
            method,
            secure,
            hipaa_compliant: secure,
            native_support: !self.force_fallback,
        }
    }
}

impl Default for EncryptionProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn envelope(msg: &ChatMessage, method: CipherMethod, payload: String) -> EncryptedEnvelope {
    EncryptedEnvelope {
        id: msg.id.clone(),
        sender: msg.sender.clone(),
        recipient: msg.recipient.clone(),
        channel: msg.channel.clone(),
        timestamp: msg.timestamp,
        kind: msg.kind,
        encrypted: true,
        method: Some(method),
        payload,
    }
}

fn passthrough(msg: &ChatMessage) -> EncryptedEnvelope {
    EncryptedEnvelope {
        id: msg.id.clone(),
        sender: msg.sender.clone(),
        recipient: msg.recipient.clone(),
        channel: msg.channel.clone(),
        timestamp: msg.timestamp,
        kind: msg.kind,
        encrypted: false,
        method: None,
        payload: msg.text.clone(),
    }
}

fn redacted(env: &EncryptedEnvelope) -> ChatMessage {
    ChatMessage {
        id: env.id.clone(),
        sender: env.sender.clone(),
        recipient: env.recipient.clone(),
        channel: env.channel.clone(),
        timestamp: env.timestamp,
        kind: env.kind,
        text: DECRYPT_FAILURE_TEXT.to_string(),
    }
}

/// Printable random key material for the fallback cipher.
fn random_ascii_key(len: usize) -> Vec<u8> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

/// Symmetric XOR keystream: cycled key bytes mixed with cycled IV bytes.
fn xor_keystream(data: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()] ^ iv[i % iv.len()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_message() -> ChatMessage {
        ChatMessage {
            id: "msg-1".into(),
            sender: "nurse-iris".into(),
            recipient: Some("dr-okafor".into()),
            channel: "ward-7-1700000000".into(),
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            text: "Patient in bed 4 is ready for rounds".into(),
        }
    }

    #[test]
    fn test_aes_roundtrip_preserves_routing_fields() {
        let mut provider = EncryptionProvider::new();
        let msg = sample_message();

        let env = provider.encrypt_message(&msg);
        assert!(env.encrypted);
        assert_eq!(env.method, Some(CipherMethod::AesGcm));
        assert_eq!(env.id, msg.id);
        assert_eq!(env.sender, msg.sender);
        assert_eq!(env.channel, msg.channel);
        assert_ne!(env.payload, msg.text);

        let out = provider.decrypt_message(&env);
        assert_eq!(out, msg);
    }

    #[test]
    fn test_xor_roundtrip_preserves_routing_fields() {
        let mut provider = EncryptionProvider::with_fallback();
        let msg = sample_message();

        let env = provider.encrypt_message(&msg);
        assert!(env.encrypted);
        assert_eq!(env.method, Some(CipherMethod::Xor));

        let out = provider.decrypt_message(&env);
        assert_eq!(out, msg);
    }

    #[test]
    fn test_corrupted_payload_redacts() {
        let mut provider = EncryptionProvider::new();
        let msg = sample_message();
        let mut env = provider.encrypt_message(&msg);
        env.payload = "not-valid-base64!!!".into();

        let out = provider.decrypt_message(&env);
        assert_eq!(out.text, DECRYPT_FAILURE_TEXT);
        assert_eq!(out.id, msg.id);
        assert_eq!(out.sender, msg.sender);
        assert_eq!(out.channel, msg.channel);
    }

    #[test]
    fn test_tampered_ciphertext_redacts() {
        let mut provider = EncryptionProvider::new();
        let msg = sample_message();
        let mut env = provider.encrypt_message(&msg);

        let mut raw = BASE64.decode(&env.payload).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        env.payload = BASE64.encode(raw);

        assert_eq!(provider.decrypt_message(&env).text, DECRYPT_FAILURE_TEXT);
    }

    #[test]
    fn test_foreign_session_key_redacts() {
        let mut sender = EncryptionProvider::new();
        let receiver = EncryptionProvider::new();
        let env = sender.encrypt_message(&sample_message());

        // Receiver has no matching session key.
        let out = receiver.decrypt_message(&env);
        assert_eq!(out.text, DECRYPT_FAILURE_TEXT);
    }

    #[test]
    fn test_passthrough_delivery() {
        let provider = EncryptionProvider::new();
        let msg = sample_message();
        let env = passthrough(&msg);

        assert!(!env.encrypted);
        let out = provider.decrypt_message(&env);
        assert_eq!(out.text, msg.text);
    }

    #[test]
    fn test_keys_generated_lazily() {
        let mut provider = EncryptionProvider::new();
        assert!(!provider.encryption_info().active);

        provider.encrypt_message(&sample_message());
        let info = provider.encryption_info();
        assert!(info.active);
        assert!(info.secure);
        assert!(info.hipaa_compliant);
    }

    #[test]
    fn test_fallback_flagged_insecure() {
        let mut provider = EncryptionProvider::with_fallback();
        provider.generate_session_keys();
        let info = provider.encryption_info();
        assert!(info.active);
        assert!(!info.secure);
        assert!(!info.hipaa_compliant);
        assert!(!info.native_support);
    }

    #[test]
    fn test_regeneration_invalidates_old_envelopes() {
        let mut provider = EncryptionProvider::new();
        let env = provider.encrypt_message(&sample_message());

        provider.generate_session_keys();
        assert_eq!(provider.decrypt_message(&env).text, DECRYPT_FAILURE_TEXT);
    }
}
