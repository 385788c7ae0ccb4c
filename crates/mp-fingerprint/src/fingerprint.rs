//! Complete 25-dimension fingerprint

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dimension::{Dimension, FINGERPRINT_DIMENSIONS};
use crate::error::{check_value, FingerprintError, FingerprintResult};

/// Named feature values, iterated in canonical order
pub type Features = BTreeMap<Dimension, f64>;

/// Immutable 25-dimension fingerprint.
///
/// Every value is finite and inside its dimension's range; construction
/// fails otherwise. Serializes as a `name -> value` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Features", into = "Features")]
pub struct Fingerprint {
    values: [f64; FINGERPRINT_DIMENSIONS],
}

impl Fingerprint {
    /// Build from values in canonical order
    pub fn from_values(values: [f64; FINGERPRINT_DIMENSIONS]) -> FingerprintResult<Self> {
        for dim in Dimension::ALL {
            check_value(dim, values[dim.index()])?;
        }
        Ok(Self { values })
    }

    /// Build from a feature map that must contain all 25 dimensions
    pub fn from_features(features: &Features) -> FingerprintResult<Self> {
        let mut values = [0.0; FINGERPRINT_DIMENSIONS];
        for dim in Dimension::ALL {
            values[dim.index()] = *features
                .get(&dim)
                .ok_or(FingerprintError::MissingDimension(dim))?;
        }
        Self::from_values(values)
    }

    #[inline]
    pub fn get(&self, dim: Dimension) -> f64 {
        self.values[dim.index()]
    }

    /// Values in canonical order
    #[inline]
    pub fn values(&self) -> &[f64; FINGERPRINT_DIMENSIONS] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.iter().map(move |&dim| (dim, self.values[dim.index()]))
    }

    pub fn to_features(&self) -> Features {
        self.iter().collect()
    }

    /// Every value mapped onto `[0, 1]` by its range
    pub fn normalized(&self) -> [f64; FINGERPRINT_DIMENSIONS] {
        let mut out = [0.0; FINGERPRINT_DIMENSIONS];
        for dim in Dimension::ALL {
            out[dim.index()] = dim.normalize(self.values[dim.index()]);
        }
        out
    }

    /// Euclidean distance between range-normalized fingerprints
    pub fn distance(&self, other: &Fingerprint) -> f64 {
        self.normalized()
            .iter()
            .zip(other.normalized().iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    pub fn to_json(&self) -> FingerprintResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> FingerprintResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<Features> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(features: Features) -> Result<Self, Self::Error> {
        Self::from_features(&features)
    }
}

impl From<Fingerprint> for Features {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_features()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerKind;

    fn defaults() -> Features {
        AnalyzerKind::ALL
            .iter()
            .flat_map(|kind| kind.default_features())
            .copied()
            .collect()
    }

    #[test]
    fn test_defaults_form_valid_fingerprint() {
        let fp = Fingerprint::from_features(&defaults()).unwrap();
        assert_eq!(fp.get(Dimension::TempoBpm), 120.0);
        assert_eq!(fp.iter().count(), FINGERPRINT_DIMENSIONS);
        assert_eq!(fp.distance(&fp), 0.0);
    }

    #[test]
    fn test_rejects_out_of_range_and_missing() {
        let mut features = defaults();
        features.insert(Dimension::TempoBpm, 250.0);
        assert!(matches!(
            Fingerprint::from_features(&features),
            Err(FingerprintError::OutOfRange { dimension: Dimension::TempoBpm, .. })
        ));

        features.insert(Dimension::TempoBpm, f64::NAN);
        assert!(matches!(
            Fingerprint::from_features(&features),
            Err(FingerprintError::NonFinite(Dimension::TempoBpm))
        ));

        features.remove(&Dimension::TempoBpm);
        assert!(matches!(
            Fingerprint::from_features(&features),
            Err(FingerprintError::MissingDimension(Dimension::TempoBpm))
        ));
    }

    #[test]
    fn test_json_uses_dimension_names() {
        let fp = Fingerprint::from_features(&defaults()).unwrap();
        let json = fp.to_json().unwrap();
        assert!(json.contains("\"spectral_centroid\""));
        assert_eq!(Fingerprint::from_json(&json).unwrap(), fp);

        let broken = json.replace("\"lufs\": -23.0", "\"lufs\": 3.0");
        assert!(Fingerprint::from_json(&broken).is_err());
    }
}
