//! # matchwarden-core
//!
//! Core library for matchwarden - a trust-and-telemetry pipeline for
//! multiplayer games.
//!
//! The library issues signed tier tokens that attest to a session's
//! integrity posture, ingests per-match telemetry aggregates from game
//! servers, and derives a longitudinal per-player risk score from that
//! telemetry asynchronously.
//!
//! ## Components
//!
//! - **Crypto & keystore** ([`crypto`]): one persisted Ed25519 signing
//!   keypair; sign/verify over raw byte payloads.
//! - **Tier tokens** ([`token`]): canonical encoding and offline
//!   verification of signed tier tokens.
//! - **Trust service** ([`trust`]): session-start token issuance and
//!   token introspection.
//! - **Telemetry** ([`telemetry`]): submission validation, the per-match
//!   append-only sink, and the replay loader.
//! - **Outbox** ([`outbox`]): a durable filesystem queue whose state is
//!   encoded in directory membership.
//! - **Worker** ([`worker`]): the single-claim polling loop with
//!   retry/requeue semantics.
//! - **Risk** ([`risk`]): bounded per-match signal mapping, longitudinal
//!   decay scoring, the applied-marker idempotency guard, and the
//!   append-only ledger.
//! - **Retention** ([`retention`]): content-timestamp-driven pruning of
//!   every artefact above.
//!
//! The pipeline produces a risk score only; it never gates players.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod crypto;
pub mod fs_atomic;
pub mod outbox;
pub mod retention;
pub mod risk;
pub mod telemetry;
pub mod token;
pub mod trust;
pub mod worker;

pub use outbox::{Claimed, Event, Outbox};
pub use risk::handler::RiskHandler;
pub use telemetry::TelemetryService;
pub use worker::{Disposition, Worker, WorkerConfig};
