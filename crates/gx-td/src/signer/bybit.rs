//! Bybit v5 signing.
//!
//! Payload is `timestamp + apiKey + recvWindow + params`, where `params` is
//! the canonical query for GET/DELETE and the JSON body otherwise. All
//! authentication material travels in `X-BAPI-*` headers.

use gx_core::{Credential, SigningConvention};

use super::{SignError, SignInput, SigningContext, SigningScheme, canonical_query, hmac_sha256_hex, param_string};

pub const API_KEY_HEADER: &str = "X-BAPI-API-KEY";
pub const TIMESTAMP_HEADER: &str = "X-BAPI-TIMESTAMP";
pub const RECV_WINDOW_HEADER: &str = "X-BAPI-RECV-WINDOW";
pub const SIGN_HEADER: &str = "X-BAPI-SIGN";
pub const SIGN_TYPE_HEADER: &str = "X-BAPI-SIGN-TYPE";

/// Response header carrying the rate-limit reset time in epoch milliseconds.
pub const LIMIT_RESET_HEADER: &str = "X-Bapi-Limit-Reset-Timestamp";

pub struct BybitV5;

impl SigningScheme for BybitV5 {
    fn convention(&self) -> SigningConvention {
        SigningConvention::BybitV5
    }

    fn sign(
        &self,
        credential: &Credential,
        input: &SignInput<'_>,
        timestamp: u64,
        recv_window: u64,
    ) -> Result<SigningContext, SignError> {
        let (params, body) = param_string(input);
        let payload = format!("{timestamp}{}{recv_window}{params}", credential.api_key);
        let signature = hmac_sha256_hex(&credential.api_secret, &payload)?;

        let headers = vec![
            (API_KEY_HEADER.into(), credential.api_key.clone()),
            (TIMESTAMP_HEADER.into(), timestamp.to_string()),
            (RECV_WINDOW_HEADER.into(), recv_window.to_string()),
            (SIGN_HEADER.into(), signature.clone()),
            (SIGN_TYPE_HEADER.into(), "2".into()),
        ];
        let query = canonical_query(input.query);

        Ok(SigningContext {
            timestamp,
            recv_window,
            canonical_query: query.clone(),
            payload,
            signature,
            headers,
            query,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::credential;
    use super::super::{Params, SignInput, Signer};
    use gx_core::{HttpMethod, SigningConvention};

    const KEY: &str = "A1b2C3d4E5f6G7h8I9";
    const SECRET: &str = "S3cr3tS3cr3tS3cr3tS3cr3tS3cr3tS3cr3t";
    const TS: u64 = 1_700_000_000_000;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn golden_vector_get() {
        let signer = Signer::with_builtin();
        let cred = credential("bybit", KEY, SECRET);
        let query = params(&[("accountType", "UNIFIED")]);
        let empty = Params::new();
        let input = SignInput {
            method: HttpMethod::Get,
            path: "/v5/account/wallet-balance",
            query: &query,
            body: &empty,
            recv_window: Some(5000),
        };

        let ctx = signer.sign_at(&cred, SigningConvention::BybitV5, &input, TS).unwrap();
        assert_eq!(ctx.payload, "1700000000000A1b2C3d4E5f6G7h8I95000accountType=UNIFIED");
        assert_eq!(ctx.signature, "b825318fc101b0cf82774892c4d92d3b25cf9b327ae5546899db52e3069a7f2e");
        assert_eq!(ctx.header("X-BAPI-API-KEY"), Some(KEY));
        assert_eq!(ctx.header("X-BAPI-TIMESTAMP"), Some("1700000000000"));
        assert_eq!(ctx.header("X-BAPI-RECV-WINDOW"), Some("5000"));
        assert_eq!(ctx.header("X-BAPI-SIGN"), Some(ctx.signature.as_str()));
        assert_eq!(ctx.header("X-BAPI-SIGN-TYPE"), Some("2"));
        assert_eq!(ctx.query, "accountType=UNIFIED");
        assert!(ctx.body.is_none());
    }

    #[test]
    fn golden_vector_post_signs_the_body() {
        let signer = Signer::with_builtin();
        let cred = credential("bybit", KEY, SECRET);
        let empty = Params::new();
        let body = params(&[("symbol", "BTCUSDT"), ("category", "spot")]);
        let input = SignInput { method: HttpMethod::Post, path: "/v5/order/create", query: &empty, body: &body, recv_window: None };

        let ctx = signer.sign_at(&cred, SigningConvention::BybitV5, &input, TS).unwrap();
        assert_eq!(ctx.body.as_deref(), Some(r#"{"category":"spot","symbol":"BTCUSDT"}"#));
        assert_eq!(ctx.signature, "3b159dd276e9522f59a18787455eec7951395e2d84bbed773c27666f53b478be");
        assert_eq!(ctx.query, "");
    }
}
