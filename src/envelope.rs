//! Request envelope codec for the NetEase `weapi` endpoints.
//!
//! Every request body is sent as two form fields:
//!
//! - `params`: the JSON payload encrypted twice with AES-128-CBC, first with
//!   the protocol's static key and then with a fresh per-request key, each pass
//!   base64 encoded.
//! - `encSecKey`: the per-request key, reversed and raised to the service's
//!   public exponent, as fixed-width lowercase hex.
//!
//! The construction is dictated by the service and is not a general purpose
//! encryption scheme. The IV is shared by both passes.

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use num_bigint::BigUint;
use rand::Rng;
use serde::Serialize;

use crate::error::{Error, Result};

/// Static first-pass key shared by every client.
const NETEASE_PRESET_KEY: &[u8; 16] = b"0CoJUm6Qyw8W8jud";

/// IV used for both AES passes.
const NETEASE_IV: &[u8; 16] = b"0102030405060708";

const NETEASE_EXPONENT_HEX: &str = "010001";

const NETEASE_MODULUS_HEX: &str = concat!(
    "00e0b509f6259df8642dbc35662901477df22677ec152b5ff68ace615bb7b725",
    "152b3ab17a876aea8a5aa76d2e417629ec4ee341f56135fccf695280104e0312",
    "ecbda92557c93870114af6c9d05c4f7f0c3685b7a46bee255932575cce10b424",
    "d813cfe4875d3e82047b97ddef52741d546b8e289dc6935b3ece0462db0a22b8e7",
);

/// Characters an ephemeral key is drawn from.
const KEY_ALPHABET: &[u8; 16] = b"0123456789abcdef";

/// Length of both symmetric keys in bytes.
pub const KEY_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Protocol constants injected into an [`EnvelopeCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParams {
    static_key: [u8; KEY_LEN],
    iv: [u8; KEY_LEN],
    modulus: BigUint,
    exponent: BigUint,
}

impl CodecParams {
    /// Builds a parameter set from explicit constants.
    #[must_use]
    pub const fn new(
        static_key: [u8; KEY_LEN],
        iv: [u8; KEY_LEN],
        modulus: BigUint,
        exponent: BigUint,
    ) -> Self {
        Self {
            static_key,
            iv,
            modulus,
            exponent,
        }
    }

    /// The constants the NetEase web client uses.
    #[must_use]
    pub fn netease() -> Self {
        let modulus = BigUint::parse_bytes(NETEASE_MODULUS_HEX.as_bytes(), 16)
            .expect("modulus constant is valid hex");
        let exponent = BigUint::parse_bytes(NETEASE_EXPONENT_HEX.as_bytes(), 16)
            .expect("exponent constant is valid hex");
        Self::new(*NETEASE_PRESET_KEY, *NETEASE_IV, modulus, exponent)
    }

    /// Returns the modulus.
    #[must_use]
    pub const fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Number of hex digits in a rendered `encSecKey`.
    #[must_use]
    pub fn enc_sec_key_width(&self) -> usize {
        let bytes = self.modulus.bits().div_ceil(8);
        usize::try_from(bytes).unwrap_or(usize::MAX / 2) * 2
    }
}

impl Default for CodecParams {
    fn default() -> Self {
        Self::netease()
    }
}

/// A per-request symmetric key made of lowercase hex digit characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EphemeralKey([u8; KEY_LEN]);

impl EphemeralKey {
    /// Draws a fresh key from the thread-local RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut key = [0u8; KEY_LEN];
        for byte in &mut key {
            *byte = KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())];
        }
        Self(key)
    }

    /// Wraps an existing key. Returns `None` unless every byte is in the key alphabet.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Option<Self> {
        bytes
            .iter()
            .all(|b| KEY_ALPHABET.contains(b))
            .then_some(Self(bytes))
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// The key as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Every byte comes from KEY_ALPHABET, which is ASCII.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl std::fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EphemeralKey(..)")
    }
}

/// The two form fields the service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// Double-encrypted payload, base64.
    pub params: String,
    /// Asymmetrically transformed ephemeral key, fixed-width hex.
    #[serde(rename = "encSecKey")]
    pub enc_sec_key: String,
}

/// An envelope together with the ephemeral key that produced it.
#[derive(Debug, Clone)]
pub struct SealedRequest {
    /// Form body to send.
    pub envelope: Envelope,
    /// The second-pass key, needed to open `envelope.params` again.
    pub secret: EphemeralKey,
}

/// Encrypts request payloads into [`Envelope`]s.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec {
    params: CodecParams,
}

impl EnvelopeCodec {
    /// Creates a codec over the given constants.
    #[must_use]
    pub const fn new(params: CodecParams) -> Self {
        Self { params }
    }

    /// Returns the codec constants.
    #[must_use]
    pub const fn params(&self) -> &CodecParams {
        &self.params
    }

    /// Encrypts `payload` under a freshly generated ephemeral key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the payload does not serialize to a JSON
    /// object, or [`Error::Arithmetic`] if the codec constants cannot encrypt
    /// a 16-byte key.
    pub fn encrypt<T: Serialize + ?Sized>(&self, payload: &T) -> Result<SealedRequest> {
        let secret = EphemeralKey::generate();
        let envelope = self.encrypt_with_key(payload, &secret)?;
        Ok(SealedRequest { envelope, secret })
    }

    /// Encrypts `payload` under the given ephemeral key.
    ///
    /// # Errors
    ///
    /// Same as [`encrypt`](Self::encrypt).
    pub fn encrypt_with_key<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        secret: &EphemeralKey,
    ) -> Result<Envelope> {
        let json = serde_json::to_vec(payload).map_err(|e| Error::Encoding(e.to_string()))?;
        if json.first() != Some(&b'{') {
            return Err(Error::Encoding("payload must be a JSON object".to_string()));
        }

        let intermediate = aes_cbc_base64(&json, &self.params.static_key, &self.params.iv);
        let params = aes_cbc_base64(intermediate.as_bytes(), secret.as_bytes(), &self.params.iv);
        let enc_sec_key = self.encrypt_key(secret)?;

        Ok(Envelope {
            params,
            enc_sec_key,
        })
    }

    /// Reverses both AES passes of `params` and returns the JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `params` is not valid base64, has bad
    /// padding, or the plaintext is not UTF-8.
    pub fn open(&self, params: &str, secret: &EphemeralKey) -> Result<String> {
        let intermediate = aes_cbc_unbase64(params, secret.as_bytes(), &self.params.iv)?;
        let intermediate = String::from_utf8(intermediate)
            .map_err(|e| Error::Decode(format!("intermediate is not UTF-8: {e}")))?;
        let json = aes_cbc_unbase64(&intermediate, &self.params.static_key, &self.params.iv)?;
        String::from_utf8(json).map_err(|e| Error::Decode(format!("payload is not UTF-8: {e}")))
    }

    /// Computes `encSecKey` for a key: reversed, exponentiated, padded hex.
    fn encrypt_key(&self, secret: &EphemeralKey) -> Result<String> {
        let CodecParams {
            modulus, exponent, ..
        } = &self.params;

        if modulus.bits() == 0 {
            return Err(Error::Arithmetic("modulus is zero".to_string()));
        }

        let mut reversed = *secret.as_bytes();
        reversed.reverse();
        let base = BigUint::from_bytes_be(&reversed);
        if &base >= modulus {
            return Err(Error::Arithmetic(format!(
                "key integer ({} bits) does not fit modulus ({} bits)",
                base.bits(),
                modulus.bits()
            )));
        }

        let result = base.modpow(exponent, modulus);
        Ok(to_padded_hex(&result, self.params.enc_sec_key_width()))
    }
}

/// Renders `value` as lowercase hex, left-padded with zeros to `width` digits.
fn to_padded_hex(value: &BigUint, width: usize) -> String {
    format!("{:0>width$}", value.to_str_radix(16))
}

fn aes_cbc_base64(plaintext: &[u8], key: &[u8; KEY_LEN], iv: &[u8; KEY_LEN]) -> String {
    let cipher = Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    STANDARD.encode(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn aes_cbc_unbase64(encoded: &str, key: &[u8; KEY_LEN], iv: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    let ciphertext = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Decode(format!("invalid base64: {e}")))?;
    let cipher = Aes128CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Error::Decode("bad block padding".to_string()))
}
