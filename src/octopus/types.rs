use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AgileWatchError, Result};

/// Grid supply point region selecting which Agile price schedule to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    J,
    K,
    L,
    M,
    N,
    P,
}

impl Region {
    /// Every published region code
    pub const ALL: [Region; 14] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
        Self::H,
        Self::J,
        Self::K,
        Self::L,
        Self::M,
        Self::N,
        Self::P,
    ];

    /// Parse a region code. Case-insensitive; GSP ids written with a leading
    /// underscore (`_C`) are accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let upper = raw.trim().to_uppercase();
        let code = match upper.strip_prefix('_') {
            Some(rest) if rest.len() == 1 => rest,
            _ => upper.as_str(),
        };
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == code)
            .ok_or_else(|| {
                AgileWatchError::validation(
                    "octopus.region".to_string(),
                    format!("unknown region code '{}'", raw),
                )
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
            Self::G => "G",
            Self::H => "H",
            Self::J => "J",
            Self::K => "K",
            Self::L => "L",
            Self::M => "M",
            Self::N => "N",
            Self::P => "P",
        }
    }
}

impl FromStr for Region {
    type Err = AgileWatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One published half-hour unit rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRate {
    /// Price excluding VAT, pence per kWh
    #[serde(default)]
    pub value_exc_vat: Option<f64>,

    /// Price including VAT, pence per kWh (may be negative)
    pub value_inc_vat: f64,

    /// Window start
    pub valid_from: DateTime<Utc>,

    /// Window end
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl UnitRate {
    pub fn new(valid_from: DateTime<Utc>, value_inc_vat: f64) -> Self {
        Self {
            value_exc_vat: None,
            value_inc_vat,
            valid_from,
            valid_to: None,
        }
    }
}

/// One page of the standard-unit-rates listing
#[derive(Debug, Clone, Deserialize)]
pub struct UnitRatesPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<UnitRate>,
}

impl UnitRatesPage {
    /// Decode a raw response body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parse_accepts_all_codes() {
        for r in Region::ALL {
            assert_eq!(Region::parse(r.as_str()).unwrap(), r);
            assert_eq!(Region::parse(&r.as_str().to_lowercase()).unwrap(), r);
        }
    }

    #[test]
    fn region_parse_strips_gsp_underscore() {
        assert_eq!(Region::parse("_C").unwrap(), Region::C);
        assert_eq!(Region::parse("_p").unwrap(), Region::P);
    }

    #[test]
    fn region_parse_rejects_outside_alphabet() {
        for bad in ["I", "O", "Q", "Z", "", "AB", "__A", "_"] {
            assert!(Region::parse(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn page_decodes_api_body() {
        let body = br#"{
            "count": 2,
            "next": null,
            "previous": null,
            "results": [
                {"value_exc_vat": 14.7, "value_inc_vat": 15.435,
                 "valid_from": "2024-01-01T00:30:00Z", "valid_to": "2024-01-01T01:00:00Z",
                 "payment_method": null},
                {"value_exc_vat": -1.0, "value_inc_vat": -1.05,
                 "valid_from": "2024-01-01T00:00:00Z", "valid_to": "2024-01-01T00:30:00Z"}
            ]
        }"#;
        let page = UnitRatesPage::from_slice(body).unwrap();
        assert_eq!(page.count, Some(2));
        assert!(page.next.is_none());
        assert_eq!(page.results.len(), 2);
        assert!((page.results[1].value_inc_vat + 1.05).abs() < 1e-9);
    }

    #[test]
    fn page_rejects_garbage() {
        assert!(UnitRatesPage::from_slice(b"<html>oops</html>").is_err());
    }
}
