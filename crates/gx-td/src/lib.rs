//! # gx-td
//!
//! Authenticated provider access: request signing, provider calls, response
//! classification and credential validation.
//!
//! ## Layers
//!
//! | Module      | Role                                                        |
//! |-------------|-------------------------------------------------------------|
//! | `signer`    | Pure HMAC signing, one [`SigningScheme`] per convention   |
//! | `client`    | Signed HTTP calls through an injected transport             |
//! | `outcome`   | Classifies every reply into an [`OutcomeEnvelope`]          |
//! | `retry`     | Backoff for `RateLimited` / `NetworkError` only             |
//! | `validator` | Static checks plus one balance call, CAS verdict write      |
//! | `gateway`   | `add_credential` and the rest of the ingestion surface      |
//!
//! ## Supported conventions
//!
//! | Convention      | Auth material                              |
//! |-----------------|--------------------------------------------|
//! | `binance_hmac`  | `X-MBX-APIKEY` header, `signature` query   |
//! | `bybit_v5`      | `X-BAPI-*` headers                         |
//! | `mexc_contract` | `ApiKey` / `Request-Time` / `Signature`    |

pub mod client;
pub mod gateway;
pub mod outcome;
pub mod retry;
pub mod signer;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Operation, ProviderClient, ProviderClients};
pub use gateway::CredentialGateway;
pub use outcome::OutcomeEnvelope;
pub use retry::{RetryPolicy, call_with_retry};
pub use signer::{Params, SignError, SignInput, Signer, SigningContext, SigningScheme};
pub use validator::{InvalidReason, KeyValidator, ValidationResult};
