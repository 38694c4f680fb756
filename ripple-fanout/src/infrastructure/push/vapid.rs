//! VAPID 授权（RFC 8292）
//!
//! 按推送服务的 origin 签发 ES256 JWT，令牌在剩余有效期不足一小时前复用。

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use serde::{Deserialize, Serialize};

use crate::error::PushDeliveryError;

/// 令牌有效期（推送服务要求不超过 24 小时）
pub const VAPID_TOKEN_TTL_SECONDS: i64 = 12 * 60 * 60;
const REFRESH_MARGIN_SECONDS: i64 = 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct VapidClaims {
    pub aud: String,
    pub exp: i64,
    pub sub: String,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

pub struct VapidSigner {
    encoding_key: EncodingKey,
    /// 未压缩公钥，base64url
    public_key: String,
    subject: String,
    tokens: DashMap<String, CachedToken>,
}

impl VapidSigner {
    /// `private_key` 为 base64url 编码的 32 字节 P-256 私钥
    pub fn from_base64_private_key(
        private_key: &str,
        subject: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(private_key.trim().trim_end_matches('='))
            .context("VAPID private key is not valid base64url")?;
        let secret =
            SecretKey::from_slice(&raw).context("VAPID private key is not a valid P-256 scalar")?;
        Self::from_secret_key(&secret, subject)
    }

    pub fn from_secret_key(secret: &SecretKey, subject: impl Into<String>) -> anyhow::Result<Self> {
        let der = secret
            .to_pkcs8_der()
            .context("Failed to encode VAPID key as PKCS#8")?;
        let public_key =
            URL_SAFE_NO_PAD.encode(secret.public_key().to_encoded_point(false).as_bytes());
        Ok(Self {
            encoding_key: EncodingKey::from_ec_der(der.as_bytes()),
            public_key,
            subject: subject.into(),
            tokens: DashMap::new(),
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// 端点对应的 `Authorization` 头：`vapid t=<jwt>, k=<公钥>`
    pub fn authorization(&self, endpoint: &str, now: i64) -> Result<String, PushDeliveryError> {
        let audience = audience(endpoint)?;
        let token = self.token_for(&audience, now)?;
        Ok(format!("vapid t={token}, k={}", self.public_key))
    }

    fn token_for(&self, audience: &str, now: i64) -> Result<String, PushDeliveryError> {
        if let Some(cached) = self.tokens.get(audience) {
            if cached.expires_at - now > REFRESH_MARGIN_SECONDS {
                return Ok(cached.token.clone());
            }
        }

        let claims = VapidClaims {
            aud: audience.to_string(),
            exp: now + VAPID_TOKEN_TTL_SECONDS,
            sub: self.subject.clone(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &self.encoding_key)
            .map_err(|err| PushDeliveryError::Encryption(format!("Failed to sign VAPID token: {err}")))?;

        self.tokens.insert(
            audience.to_string(),
            CachedToken {
                token: token.clone(),
                expires_at: claims.exp,
            },
        );
        Ok(token)
    }
}

/// JWT 的 `aud`：端点的 origin（scheme://host[:port]）
pub fn audience(endpoint: &str) -> Result<String, PushDeliveryError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|err| PushDeliveryError::Transport(format!("Invalid push endpoint: {err}")))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(PushDeliveryError::Transport(format!(
            "Unsupported push endpoint scheme: {}",
            url.scheme()
        )));
    }
    Ok(url.origin().ascii_serialization())
}
