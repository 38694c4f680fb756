//! Web Push 负载加密（RFC 8291，`aes128gcm` 内容编码）
//!
//! 每次投递生成一次性的 ECDH 密钥对和 16 字节盐，负载放在单个记录里。

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::Hkdf;
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::rand_core::RngCore;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::Sha256;

use crate::domain::model::PushKeys;
use crate::error::PushDeliveryError;

/// 记录大小（写入 aes128gcm 头部的 rs 字段）
pub const RECORD_SIZE: u32 = 4096;
/// 推送服务接受的最大请求体
const MAX_BODY_LEN: usize = 4096;
const SALT_LEN: usize = 16;
const AUTH_SECRET_LEN: usize = 16;
const TAG_LEN: usize = 16;
/// 未压缩 P-256 公钥长度
const PUBLIC_KEY_LEN: usize = 65;
/// salt(16) + rs(4) + idlen(1) + keyid(65)
const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;
/// 最后一个记录的填充分隔符
const LAST_RECORD_DELIMITER: u8 = 0x02;

/// 可加密的最大明文长度
pub const MAX_PAYLOAD_LEN: usize = MAX_BODY_LEN - HEADER_LEN - TAG_LEN - 1;

const KEY_INFO: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// 用订阅的 `p256dh` / `auth` 加密负载，返回完整的请求体
pub fn encrypt(keys: &PushKeys, plaintext: &[u8]) -> Result<Vec<u8>, PushDeliveryError> {
    if plaintext.len() > MAX_PAYLOAD_LEN {
        return Err(PushDeliveryError::Encryption(format!(
            "payload of {} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit",
            plaintext.len()
        )));
    }

    let ua_public = PublicKey::from_sec1_bytes(&decode_base64url(&keys.p256dh)?)
        .map_err(|_| PushDeliveryError::Encryption("p256dh is not a valid P-256 point".into()))?;
    let auth_secret = decode_base64url(&keys.auth)?;
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(PushDeliveryError::Encryption(format!(
            "auth secret must be {AUTH_SECRET_LEN} bytes, got {}",
            auth_secret.len()
        )));
    }

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let as_public = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(&ua_public);
    let ua_point = ua_public.to_encoded_point(false);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let (cek, nonce) = derive_content_keys(
        shared.raw_secret_bytes().as_slice(),
        &auth_secret,
        ua_point.as_bytes(),
        as_public.as_bytes(),
        &salt,
    )?;

    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    record.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|err| PushDeliveryError::Encryption(format!("invalid content key: {err}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::<U12>::from_slice(&nonce), record.as_slice())
        .map_err(|err| PushDeliveryError::Encryption(format!("encryption failed: {err}")))?;

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(as_public.as_bytes());
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// 派生内容密钥与 nonce
fn derive_content_keys(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<([u8; 16], [u8; 12]), PushDeliveryError> {
    let derivation_failed = |_| PushDeliveryError::Encryption("key derivation failed".into());

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand_multi_info(&[KEY_INFO, ua_public, as_public], &mut ikm)
        .map_err(derivation_failed)?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; 16];
    prk.expand(CEK_INFO, &mut cek).map_err(derivation_failed)?;
    let mut nonce = [0u8; 12];
    prk.expand(NONCE_INFO, &mut nonce).map_err(derivation_failed)?;
    Ok((cek, nonce))
}

/// 浏览器给出的密钥是 base64url，部分客户端会带填充或使用标准字母表
pub(crate) fn decode_base64url(value: &str) -> Result<Vec<u8>, PushDeliveryError> {
    let normalized: String = value
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|err| PushDeliveryError::Encryption(format!("invalid base64url key: {err}")))
}

/// 用户代理一侧的解密，只用于验证加密结果
#[cfg(test)]
pub(crate) fn decrypt(ua_secret: &p256::SecretKey, auth_secret: &[u8], body: &[u8]) -> Vec<u8> {
    let salt = &body[..SALT_LEN];
    let rs = u32::from_be_bytes(body[SALT_LEN..SALT_LEN + 4].try_into().unwrap());
    assert_eq!(rs, RECORD_SIZE);
    let id_len = body[SALT_LEN + 4] as usize;
    let key_start = SALT_LEN + 5;
    let as_public_bytes = &body[key_start..key_start + id_len];
    let ciphertext = &body[key_start + id_len..];

    let as_public = PublicKey::from_sec1_bytes(as_public_bytes).unwrap();
    let shared = p256::ecdh::diffie_hellman(ua_secret.to_nonzero_scalar(), as_public.as_affine());
    let ua_public = ua_secret.public_key().to_encoded_point(false);
    let (cek, nonce) = derive_content_keys(
        shared.raw_secret_bytes().as_slice(),
        auth_secret,
        ua_public.as_bytes(),
        as_public_bytes,
        salt,
    )
    .unwrap();

    let cipher = Aes128Gcm::new_from_slice(&cek).unwrap();
    let mut record = cipher
        .decrypt(Nonce::<U12>::from_slice(&nonce), ciphertext)
        .unwrap();
    assert_eq!(record.pop(), Some(LAST_RECORD_DELIMITER));
    record
}


#[cfg(test)]
mod tests {
    use super::test_keys::browser_keys;
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_encrypted_body_decrypts_for_subscriber() {
        let (secret, auth, keys) = browser_keys();
        let plaintext = br#"{"title":"Ripple","body":"Alice liked your post"}"#;

        let body = encrypt(&keys, plaintext).unwrap();

        assert_eq!(body[SALT_LEN + 4] as usize, PUBLIC_KEY_LEN);
        assert_eq!(body.len(), HEADER_LEN + plaintext.len() + 1 + TAG_LEN);
        assert_eq!(decrypt(&secret, &auth, &body), plaintext.to_vec());
    }

    #[test]
    fn test_each_delivery_uses_fresh_salt_and_key() {
        let (_, _, keys) = browser_keys();
        let first = encrypt(&keys, b"same").unwrap();
        let second = encrypt(&keys, b"same").unwrap();
        assert_ne!(first[..HEADER_LEN], second[..HEADER_LEN]);
    }

    #[test]
    fn test_padded_standard_alphabet_keys_are_accepted() {
        let (secret, auth, keys) = browser_keys();
        let standard = PushKeys {
            p256dh: base64::engine::general_purpose::STANDARD.encode(decode_base64url(&keys.p256dh).unwrap()),
            auth: base64::engine::general_purpose::STANDARD.encode(auth),
        };

        let body = encrypt(&standard, b"hi").unwrap();
        assert_eq!(decrypt(&secret, &auth, &body), b"hi".to_vec());
    }

    #[test]
    fn test_invalid_keys_and_oversized_payload_are_rejected() {
        let (_, _, keys) = browser_keys();

        let bad_point = PushKeys {
            p256dh: URL_SAFE_NO_PAD.encode([4u8; 65]),
            ..keys.clone()
        };
        assert!(matches!(encrypt(&bad_point, b"x"), Err(PushDeliveryError::Encryption(_))));

        let short_auth = PushKeys {
            auth: URL_SAFE_NO_PAD.encode([1u8; 8]),
            ..keys.clone()
        };
        assert!(matches!(encrypt(&short_auth, b"x"), Err(PushDeliveryError::Encryption(_))));

        let oversized = vec![b'a'; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(encrypt(&keys, &oversized), Err(PushDeliveryError::Encryption(_))));
        assert!(encrypt(&keys, &oversized[..MAX_PAYLOAD_LEN]).is_ok());
    }
}
