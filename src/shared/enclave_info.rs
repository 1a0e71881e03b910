//! Enclave info file: the measurements each platform service must attest to.
//!
//! The file is TOML with one table per service:
//!
//! ```toml
//! [teaclave_frontend_service]
//! mr_enclave = "<64 hex digits>"
//! mr_signer = "<64 hex digits>"
//! ```
//!
//! Verifying a quote against these values happens inside the attested
//! channel; this module only loads and checks the file.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// Size in bytes of an enclave or signer measurement.
pub const MEASUREMENT_LEN: usize = 32;

/// Expected identity of one service enclave.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnclaveMeasurement {
    /// Hash of the enclave code and initial data.
    pub mr_enclave: [u8; MEASUREMENT_LEN],
    /// Hash of the enclave signing key.
    pub mr_signer: [u8; MEASUREMENT_LEN],
}

impl fmt::Debug for EnclaveMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnclaveMeasurement")
            .field("mr_enclave", &hex::encode(self.mr_enclave))
            .field("mr_signer", &hex::encode(self.mr_signer))
            .finish()
    }
}

#[derive(Deserialize)]
struct RawMeasurement {
    mr_enclave: String,
    mr_signer: String,
}

/// Parsed enclave info file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnclaveInfo {
    services: BTreeMap<String, EnclaveMeasurement>,
}

impl EnclaveInfo {
    /// Load enclave info from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Connection(format!(
                "cannot read enclave info {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse enclave info from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the file is not valid TOML or a
    /// measurement is not 32 hex-encoded bytes.
    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawMeasurement> = toml::from_str(content)
            .map_err(|e| Error::Connection(format!("malformed enclave info: {}", e)))?;

        let mut services = BTreeMap::new();
        for (name, entry) in raw {
            let measurement = EnclaveMeasurement {
                mr_enclave: decode_measurement(&name, "mr_enclave", &entry.mr_enclave)?,
                mr_signer: decode_measurement(&name, "mr_signer", &entry.mr_signer)?,
            };
            services.insert(name, measurement);
        }

        Ok(Self { services })
    }

    /// Adds or replaces the measurement of a service.
    pub fn insert(&mut self, service_name: impl Into<String>, measurement: EnclaveMeasurement) {
        self.services.insert(service_name.into(), measurement);
    }

    /// Expected measurement of `service_name`.
    ///
    /// A service missing from the file cannot be attested, so this is a
    /// [`Error::Connection`].
    pub fn measurement(&self, service_name: &str) -> Result<&EnclaveMeasurement> {
        self.services.get(service_name).ok_or_else(|| {
            Error::Connection(format!(
                "enclave info has no entry for {}",
                service_name
            ))
        })
    }

    /// Names of the services described by the file.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

fn decode_measurement(service: &str, field: &str, value: &str) -> Result<[u8; MEASUREMENT_LEN]> {
    let bytes = hex::decode(value.trim()).map_err(|e| {
        Error::Connection(format!("{}.{} is not hex: {}", service, field, e))
    })?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::Connection(format!(
            "{}.{} is {} bytes, expected {}",
            service,
            field,
            bytes.len(),
            MEASUREMENT_LEN
        ))
    })
}
