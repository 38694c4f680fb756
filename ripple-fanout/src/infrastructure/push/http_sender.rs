//! HTTP 推送投递
//!
//! 负载按 `aes128gcm` 加密后 POST 到订阅端点，并附带按 origin 签发的 VAPID 授权头。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, Request, StatusCode};

use super::encryption;
use super::vapid::VapidSigner;
use crate::domain::model::{PushPayload, PushSubscription};
use crate::domain::repository::PushSender;
use crate::error::PushDeliveryError;

const DEFAULT_MESSAGE_TTL_SECONDS: u64 = 24 * 60 * 60;
const REJECTION_REASON_LIMIT: usize = 256;

pub struct HttpPushSender {
    client: Client,
    signer: VapidSigner,
    message_ttl_seconds: u64,
}

impl HttpPushSender {
    pub fn new(
        timeout: Duration,
        message_ttl_seconds: Option<u64>,
        signer: VapidSigner,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            signer,
            message_ttl_seconds: message_ttl_seconds.unwrap_or(DEFAULT_MESSAGE_TTL_SECONDS),
        })
    }

    /// 构造单次投递请求：加密后的负载、`TTL` / `Urgency` 与 VAPID 授权头
    pub fn build_request(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<Request, PushDeliveryError> {
        let plaintext = serde_json::to_vec(payload).map_err(|err| {
            PushDeliveryError::Encryption(format!("Failed to serialize push payload: {err}"))
        })?;
        let body = encryption::encrypt(&subscription.keys, &plaintext)?;
        let authorization = self
            .signer
            .authorization(&subscription.endpoint, Utc::now().timestamp())?;

        self.client
            .post(&subscription.endpoint)
            .header("TTL", self.message_ttl_seconds.to_string())
            .header("Urgency", "normal")
            .header(CONTENT_ENCODING, "aes128gcm")
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(AUTHORIZATION, authorization)
            .body(body)
            .build()
            .map_err(|err| PushDeliveryError::Transport(err.to_string()))
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushDeliveryError> {
        let request = self.build_request(subscription, payload)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| PushDeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let reason = response.text().await.unwrap_or_default();
        Err(classify_rejection(status, reason))
    }
}

/// 非 2xx 响应：404 / 410 表示订阅失效，其余保留状态码与截断后的原因
fn classify_rejection(status: StatusCode, mut reason: String) -> PushDeliveryError {
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return PushDeliveryError::Gone(status.as_u16());
    }
    if reason.len() > REJECTION_REASON_LIMIT {
        let cut = (0..=REJECTION_REASON_LIMIT)
            .rev()
            .find(|i| reason.is_char_boundary(*i))
            .unwrap_or(0);
        reason.truncate(cut);
    }
    PushDeliveryError::Rejected {
        status: status.as_u16(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{NotificationType, PushPayloadData};
    use crate::infrastructure::push::encryption::{decrypt, test_keys::browser_keys};
    use aes_gcm::aead::OsRng;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use p256::SecretKey;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    const ENDPOINT: &str = "https://updates.push.example.net/wpush/v2/gAAAAABk";

    fn payload() -> PushPayload {
        PushPayload {
            title: "Ripple".to_string(),
            body: "Alice liked your post".to_string(),
            icon: None,
            badge: None,
            data: PushPayloadData {
                kind: NotificationType::Like,
                url: "/post/p1".to_string(),
            },
        }
    }

    fn subscription(keys: crate::domain::model::PushKeys) -> PushSubscription {
        let now = Utc::now();
        PushSubscription {
            id: "sub-1".to_string(),
            user_id: "bob".to_string(),
            endpoint: ENDPOINT.to_string(),
            keys,
            user_agent: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_request_is_encrypted_and_signed_for_endpoint_origin() {
        let vapid_secret = SecretKey::random(&mut OsRng);
        let signer = VapidSigner::from_secret_key(&vapid_secret, "mailto:ops@ripple.test").unwrap();
        let sender = HttpPushSender::new(Duration::from_secs(5), Some(60), signer).unwrap();
        let (ua_secret, auth, keys) = browser_keys();

        let request = sender.build_request(&subscription(keys), &payload()).unwrap();

        let headers = request.headers();
        assert_eq!(headers[CONTENT_ENCODING], "aes128gcm");
        assert_eq!(headers[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(headers["TTL"], "60");

        let authorization = headers[AUTHORIZATION].to_str().unwrap();
        let rest = authorization.strip_prefix("vapid t=").unwrap();
        let (jwt, public_key) = rest.split_once(", k=").unwrap();
        let vapid_public = vapid_secret.public_key().to_encoded_point(false);
        assert_eq!(public_key, URL_SAFE_NO_PAD.encode(vapid_public.as_bytes()));

        let segments: Vec<&str> = jwt.split('.').collect();
        assert_eq!(segments.len(), 3);
        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "ES256");
        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://updates.push.example.net");
        assert_eq!(claims["sub"], "mailto:ops@ripple.test");
        let exp = claims["exp"].as_i64().unwrap();
        let now = Utc::now().timestamp();
        assert!(exp > now && exp <= now + 24 * 60 * 60);

        let verifying = VerifyingKey::from_sec1_bytes(vapid_public.as_bytes()).unwrap();
        let signature = Signature::from_slice(&URL_SAFE_NO_PAD.decode(segments[2]).unwrap()).unwrap();
        let signed = format!("{}.{}", segments[0], segments[1]);
        assert!(verifying.verify(signed.as_bytes(), &signature).is_ok());

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let plaintext = decrypt(&ua_secret, &auth, body);
        let decoded: PushPayload = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(decoded, payload());
    }

    #[test]
    fn test_invalid_subscription_keys_fail_before_sending() {
        let signer =
            VapidSigner::from_secret_key(&SecretKey::random(&mut OsRng), "mailto:ops@ripple.test").unwrap();
        let sender = HttpPushSender::new(Duration::from_secs(5), None, signer).unwrap();
        let (_, _, mut keys) = browser_keys();
        keys.p256dh = "AAAA".to_string();

        let err = sender.build_request(&subscription(keys), &payload()).unwrap_err();
        assert!(matches!(err, PushDeliveryError::Encryption(_)));
        assert!(!err.is_gone());
    }

    #[test]
    fn test_gone_statuses_and_truncated_rejections() {
        assert_eq!(
            classify_rejection(StatusCode::GONE, String::new()),
            PushDeliveryError::Gone(410)
        );
        assert_eq!(
            classify_rejection(StatusCode::NOT_FOUND, "no such subscription".to_string()),
            PushDeliveryError::Gone(404)
        );

        let long = "é".repeat(200);
        match classify_rejection(StatusCode::TOO_MANY_REQUESTS, long) {
            PushDeliveryError::Rejected { status, reason } => {
                assert_eq!(status, 429);
                assert!(reason.len() <= REJECTION_REASON_LIMIT);
                assert!(reason.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
