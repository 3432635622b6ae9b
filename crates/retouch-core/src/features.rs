//! Feature index configuration.
//!
//! Maps feature names (e.g. `upper_lip`) to ordered rings of landmark
//! indices. The default face-mesh map is embedded at compile time from
//! `contrib/features/face_mesh.toml`; custom maps load from TOML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Compile-time embedded feature map for the 468/478-point face mesh.
const FACE_MESH_TOML: &str = include_str!("../../../contrib/features/face_mesh.toml");

static FACE_MESH: OnceLock<Result<FeatureMap, String>> = OnceLock::new();

pub const FACE_OVAL: &str = "face_oval";
pub const FOREHEAD: &str = "forehead";
pub const UPPER_LIP: &str = "upper_lip";
pub const LOWER_LIP: &str = "lower_lip";
pub const MOUTH_INSIDE: &str = "mouth_inside";
pub const LEFT_EYE: &str = "left_eye";
pub const RIGHT_EYE: &str = "right_eye";
pub const LEFT_BROW: &str = "left_brow";
pub const RIGHT_BROW: &str = "right_brow";
pub const LEFT_IRIS: &str = "left_iris";
pub const RIGHT_IRIS: &str = "right_iris";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read feature map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bad feature map TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("feature '{0}' is not defined in the feature map")]
    MissingFeature(String),
    #[error("feature '{0}' has no landmark indices")]
    EmptyFeature(String),
    #[error("feature '{feature}' references landmark {index}, but the model has {landmark_count}")]
    IndexOutOfRange {
        feature: String,
        index: usize,
        landmark_count: usize,
    },
    #[error("embedded feature map is invalid: {0}")]
    Embedded(String),
}

/// A named, ordered ring of landmark indices. Indices may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureIndexSet {
    pub name: String,
    pub indices: Vec<usize>,
}

impl FeatureIndexSet {
    pub fn new(name: impl Into<String>, indices: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            indices,
        }
    }
}

/// On-disk layout of a feature map file.
#[derive(Debug, Deserialize)]
struct FeatureMapFile {
    #[serde(default)]
    landmark_count: Option<usize>,
    features: BTreeMap<String, Vec<usize>>,
}

/// Static feature-name → index-set mapping, shared read-only across frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMap {
    /// Number of landmarks the index convention was written for, if declared.
    pub landmark_count: Option<usize>,
    features: BTreeMap<String, FeatureIndexSet>,
}

impl FeatureMap {
    /// Build a map from in-memory sets. Later sets replace earlier ones with the same name.
    pub fn from_sets(
        landmark_count: Option<usize>,
        sets: impl IntoIterator<Item = FeatureIndexSet>,
    ) -> Result<Self, ConfigError> {
        let features = sets.into_iter().map(|s| (s.name.clone(), s)).collect();
        let map = Self {
            landmark_count,
            features,
        };
        map.validate()?;
        Ok(map)
    }

    /// Parse a feature map from TOML text.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let file: FeatureMapFile = toml::from_str(src)?;
        Self::from_sets(
            file.landmark_count,
            file.features
                .into_iter()
                .map(|(name, indices)| FeatureIndexSet::new(name, indices)),
        )
    }

    /// Load a feature map from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let map = Self::from_toml_str(&src)?;
        tracing::info!(
            path = %path.display(),
            features = map.len(),
            landmark_count = ?map.landmark_count,
            "loaded feature map"
        );
        Ok(map)
    }

    /// The embedded face-mesh feature map, parsed once per process.
    pub fn face_mesh() -> Result<&'static FeatureMap, ConfigError> {
        FACE_MESH
            .get_or_init(|| FeatureMap::from_toml_str(FACE_MESH_TOML).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| ConfigError::Embedded(e.clone()))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureIndexSet> {
        self.features.get(name)
    }

    /// Look up a feature, failing with [`ConfigError::MissingFeature`].
    pub fn feature(&self, name: &str) -> Result<&FeatureIndexSet, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingFeature(name.to_string()))
    }

    /// Check that every name is present. Call before the first frame.
    pub fn require(&self, names: &[&str]) -> Result<(), ConfigError> {
        names.iter().try_for_each(|name| self.feature(name).map(|_| ()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for set in self.features.values() {
            if set.indices.is_empty() {
                return Err(ConfigError::EmptyFeature(set.name.clone()));
            }
            if let Some(count) = self.landmark_count {
                if let Some(&index) = set.indices.iter().find(|&&i| i >= count) {
                    return Err(ConfigError::IndexOutOfRange {
                        feature: set.name.clone(),
                        index,
                        landmark_count: count,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_face_mesh_parses() {
        let map = FeatureMap::face_mesh().unwrap();
        assert_eq!(map.landmark_count, Some(478));
        map.require(&[
            FACE_OVAL, FOREHEAD, UPPER_LIP, LOWER_LIP, MOUTH_INSIDE,
            LEFT_EYE, RIGHT_EYE, LEFT_BROW, RIGHT_BROW, LEFT_IRIS, RIGHT_IRIS,
        ])
        .unwrap();
        assert_eq!(map.get(FOREHEAD).unwrap().indices[0], 10);
    }

    #[test]
    fn test_require_reports_missing_name() {
        let map = FeatureMap::from_toml_str("[features]\nlips = [0, 1, 2]\n").unwrap();
        let err = map.require(&["lips", "teeth"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFeature(ref n) if n == "teeth"), "{err}");
    }

    #[test]
    fn test_index_out_of_range_rejected() {
        let src = "landmark_count = 4\n[features]\nsquare = [0, 1, 2, 4]\n";
        let err = FeatureMap::from_toml_str(src).unwrap_err();
        assert!(
            matches!(err, ConfigError::IndexOutOfRange { index: 4, landmark_count: 4, .. }),
            "{err}"
        );
    }

    #[test]
    fn test_unbounded_map_accepts_any_index() {
        let map = FeatureMap::from_toml_str("[features]\nfar = [0, 9999, 3]\n").unwrap();
        assert_eq!(map.feature("far").unwrap().indices, vec![0, 9999, 3]);
    }

    #[test]
    fn test_empty_feature_rejected() {
        let err = FeatureMap::from_toml_str("[features]\nnothing = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyFeature(_)), "{err}");
    }

    #[test]
    fn test_bad_toml_rejected() {
        assert!(matches!(
            FeatureMap::from_toml_str("features = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_sets_last_write_wins() {
        let map = FeatureMap::from_sets(
            None,
            [
                FeatureIndexSet::new("lips", vec![0, 1, 2]),
                FeatureIndexSet::new("lips", vec![3, 4, 5]),
            ],
        )
        .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.feature("lips").unwrap().indices, vec![3, 4, 5]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = FeatureMap::load("/nonexistent/features.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }), "{err}");
    }
}
