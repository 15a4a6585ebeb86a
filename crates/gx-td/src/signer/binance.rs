//! Binance HMAC signing.
//!
//! Every parameter (query and body alike) plus `recvWindow` and `timestamp`
//! goes into one canonical query string. The HMAC of that string is appended
//! as `&signature=<hex>` and the API key travels in `X-MBX-APIKEY`. Nothing
//! is sent in the body.

use gx_core::{Credential, SigningConvention};

use super::{Params, SignError, SignInput, SigningContext, SigningScheme, canonical_query, hmac_sha256_hex};

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

pub struct BinanceHmac;

impl SigningScheme for BinanceHmac {
    fn convention(&self) -> SigningConvention {
        SigningConvention::BinanceHmac
    }

    fn sign(
        &self,
        credential: &Credential,
        input: &SignInput<'_>,
        timestamp: u64,
        recv_window: u64,
    ) -> Result<SigningContext, SignError> {
        let mut params: Params = input.query.clone();
        params.extend(input.body.iter().map(|(k, v)| (k.clone(), v.clone())));
        params.insert("recvWindow".into(), recv_window.to_string());
        params.insert("timestamp".into(), timestamp.to_string());

        let canonical = canonical_query(&params);
        let signature = hmac_sha256_hex(&credential.api_secret, &canonical)?;
        let query = format!("{canonical}&signature={signature}");

        Ok(SigningContext {
            timestamp,
            recv_window,
            payload: canonical.clone(),
            canonical_query: canonical,
            signature,
            headers: vec![(API_KEY_HEADER.into(), credential.api_key.clone())],
            query,
            body: None,
        })
    }
}
