//! Vehicle identity models

use serde::{Deserialize, Serialize};

/// Vehicle brand.
///
/// The brand decides how the vendor API addresses a vehicle: some brands
/// accept the VIN, others require a vendor-assigned key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Hyundai,
    Kia,
    Genesis,
}

impl Brand {
    /// Whether vehicle-scoped calls need the vendor key rather than the VIN
    pub fn requires_vehicle_key(&self) -> bool {
        matches!(self, Brand::Kia)
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Brand::Hyundai => "hyundai",
            Brand::Kia => "kia",
            Brand::Genesis => "genesis",
        };
        write!(f, "{}", s)
    }
}

/// A vehicle registered to an account, as held by the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Vehicle identification number, the local identity
    pub vin: String,
    /// Vendor-assigned stable identifier (not the VIN)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<String>,
    pub brand: Brand,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub year: Option<u16>,
}

impl Vehicle {
    pub fn new(vin: impl Into<String>, brand: Brand) -> Self {
        Self {
            vin: vin.into(),
            key: None,
            brand,
            nickname: None,
            model: None,
            year: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Whether this vehicle must be refreshed from the vendor list before
    /// it can be addressed
    pub fn needs_key_refresh(&self) -> bool {
        self.brand.requires_vehicle_key() && self.key.is_none()
    }

    /// Identifier to put in vendor API paths: the key when known, else the VIN
    pub fn api_id(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.vin)
    }

    /// Display name, falling back to the VIN
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.vin)
    }

    /// Merge vendor-side identity into this record, keeping the brand
    pub fn apply_summary(&mut self, summary: &VehicleSummary) {
        self.key = summary.key.clone().or_else(|| self.key.take());
        if summary.nickname.is_some() {
            self.nickname = summary.nickname.clone();
        }
        if summary.model.is_some() {
            self.model = summary.model.clone();
        }
        if summary.year.is_some() {
            self.year = summary.year;
        }
    }
}

/// One row of the vendor's vehicle list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub vin: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub year: Option<u16>,
}

impl VehicleSummary {
    pub fn new(vin: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            key: None,
            nickname: None,
            model: None,
            year: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_requirement() {
        let kia = Vehicle::new("KNA123", Brand::Kia);
        assert!(kia.needs_key_refresh());
        assert_eq!(kia.api_id(), "KNA123");

        let kia = kia.with_key("vk-9");
        assert!(!kia.needs_key_refresh());
        assert_eq!(kia.api_id(), "vk-9");

        assert!(!Vehicle::new("KMH456", Brand::Hyundai).needs_key_refresh());
    }

    #[test]
    fn test_apply_summary_keeps_existing_key_when_absent() {
        let mut v = Vehicle::new("KNA123", Brand::Kia).with_key("old");
        v.apply_summary(&VehicleSummary::new("KNA123"));
        assert_eq!(v.key.as_deref(), Some("old"));

        v.apply_summary(&VehicleSummary::new("KNA123").with_key("new"));
        assert_eq!(v.key.as_deref(), Some("new"));
        assert_eq!(v.brand, Brand::Kia);
    }
}
