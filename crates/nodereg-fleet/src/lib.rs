//! nodereg-fleet — cluster membership as seen by fleet.
//!
//! Exposes the [`MembershipSource`] seam consumed by the reconciliation
//! loop, and [`FleetClient`], which implements it against the fleet v1
//! REST API served on a local unix socket.

pub mod client;
pub mod source;

pub use client::{FleetClient, parse_socket_endpoint};
pub use source::MembershipSource;
