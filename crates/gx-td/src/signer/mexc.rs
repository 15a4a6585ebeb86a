//! MEXC contract API signing.
//!
//! Payload is `apiKey + timestamp + params` (canonical query for GET/DELETE,
//! JSON body otherwise). The receive window is sent as a header but is not
//! part of the signed string.

use gx_core::{Credential, SigningConvention};

use super::{SignError, SignInput, SigningContext, SigningScheme, canonical_query, hmac_sha256_hex, param_string};

pub struct MexcContract;

impl SigningScheme for MexcContract {
    fn convention(&self) -> SigningConvention {
        SigningConvention::MexcContract
    }

    fn sign(
        &self,
        credential: &Credential,
        input: &SignInput<'_>,
        timestamp: u64,
        recv_window: u64,
    ) -> Result<SigningContext, SignError> {
        let (params, body) = param_string(input);
        let payload = format!("{}{timestamp}{params}", credential.api_key);
        let signature = hmac_sha256_hex(&credential.api_secret, &payload)?;

        let headers = vec![
            ("ApiKey".into(), credential.api_key.clone()),
            ("Request-Time".into(), timestamp.to_string()),
            ("Recv-Window".into(), recv_window.to_string()),
            ("Signature".into(), signature.clone()),
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
