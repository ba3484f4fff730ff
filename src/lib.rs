//! # Entrada (Account Authentication Service)
//!
//! `entrada` handles the user account lifecycle over HTTP: registration with
//! email verification, login issuing a bearer token, logout/token revocation,
//! and password recovery.
//!
//! ## Accounts & verification
//!
//! Registration creates a user in `pending` state (`is_verified = false`) and a
//! single-use verification code delivered out-of-band. Only the SHA-256 hash of
//! a code ever reaches the database; consuming a code flips `is_verified`
//! exactly once.
//!
//! ## Sessions
//!
//! Login issues a stateless HS256 token carrying the user id and a `jti`.
//! Validation is signature + expiry with no database round-trip; logout records
//! the `jti` in a revocation table so invalidation takes effect before natural
//! expiry.
//!
//! ## Password recovery
//!
//! Recovery creates a time-limited reset token (hashed at rest) and enqueues
//! the reset email in the same transaction, so a token never exists without its
//! outbox row. Redeeming the token re-hashes the new password with Argon2id.

pub mod cli;
pub mod entrada;
