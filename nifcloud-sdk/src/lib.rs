//! Minimal client for the NIFCLOUD Computing, RDB and DNS APIs
//!
//! Requests are signed, sent with reqwest, and answered with the XML
//! response decoded into `serde_json::Value`.

pub mod client;
pub mod config;
pub mod error;
pub mod json;
pub mod params;
pub mod signer;
pub mod xml;

pub use client::{Api, NifcloudClient};
pub use config::{ClientConfig, Service};
pub use error::{ClientError, ClientResult};
pub use params::Params;
pub use xml::Element;
pub use reqwest::Method;
