//! # Trådfri Control Library
//!
//! `tradfri-control-lib` is a Rust library for controlling IKEA Trådfri
//! gateways. It speaks the gateway's native protocol, CoAP request/response
//! over a DTLS session secured with a pre-shared key, and exposes a typed
//! API for the things you actually want to do with it: switch and dim
//! lights, set colors, position blinds, and enumerate devices and groups.
//!
//! This library is designed to be used by command-line tools or other client
//! applications that drive a gateway; it does not run a service of its own.
//!
//! ## Features
//!
//! - DTLS-PSK session establishment with the gateway, including the
//!   first-time token exchange that issues a per-client key
//! - Device and group control: power, dimming, RGB/HSL/CIE-xy color with
//!   timed transitions, blind positioning
//! - Device and group enumeration as plain serde models
//! - A transport trait seam so everything above the wire can be exercised
//!   against a stub gateway in tests
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tradfri_control_lib::control_interface::TradfriClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = TradfriClient::connect(
//!         "192.168.0.15:5684",
//!         "my-client",
//!         b"the-psk-from-authentication",
//!         Duration::from_secs(15),
//!     )
//!     .await?;
//!
//!     for device in client.list_devices().await? {
//!         println!("{}: {}", device.id, device.name);
//!     }
//!     client.set_power(65536, 1).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Disclaimer
//!
//! This project is not affiliated with, authorized by, endorsed by, or in any
//! way officially connected with IKEA or its affiliates.
//!
//! ## License
//!
//! This project is dual-licensed under the MIT License and the Apache
//! License, Version 2.0. You may choose to use either license, depending on
//! your project needs.

// The `control_interface` module is the domain-level API: one method per
// gateway operation, plus the serde models of device and group state.
pub mod control_interface;

// The `coap` module builds and parses the gateway's CoAP messages and pairs
// a transport with the message-id counter that correlates calls.
pub mod coap;

// The `dtls` module owns the encrypted datagram session to the gateway.
pub mod dtls;

// Typed errors; everything in this crate fails by returning one of these.
pub mod error;

// Color conversion and the transport trait seam.
pub mod util;

pub use error::{Error, Result};
