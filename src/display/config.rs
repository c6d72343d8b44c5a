use crate::acquisition::{AcquisitionMode, ServiceNames, TopicNames};
use crate::costs::CostColorMap;
use crate::mesh::Rgba;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const DEFAULT_HISTORY_CAPACITY: usize = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history capacity must be at least 1")]
    InvalidCapacity,
    #[error("custom cost limits [{lower}, {upper}] are not an increasing finite range")]
    InvalidCostLimits { lower: f32, upper: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayType {
    #[default]
    FixedColor,
    VertexColors,
    Textures,
    VertexCosts,
    Hidden,
}

/// Appearance settings forwarded to the renderer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub display_type: DisplayType,
    pub faces_color: Rgba,
    pub faces_alpha: f32,
    pub show_textured_faces_only: bool,
    /// Shade faces from per-triangle colors instead of per-vertex ones.
    pub use_triangle_colors: bool,
    pub show_wireframe: bool,
    pub wireframe_color: Rgba,
    pub wireframe_alpha: f32,
    pub show_normals: bool,
    pub normals_color: Rgba,
    pub normals_alpha: f32,
    pub normals_scaling_factor: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            display_type: DisplayType::FixedColor,
            faces_color: [0.0, 1.0, 0.0, 1.0],
            faces_alpha: 1.0,
            show_textured_faces_only: false,
            use_triangle_colors: false,
            show_wireframe: true,
            wireframe_color: [0.0, 0.0, 0.0, 1.0],
            wireframe_alpha: 1.0,
            show_normals: false,
            normals_color: [1.0, 0.0, 1.0, 1.0],
            normals_alpha: 1.0,
            normals_scaling_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub acquisition_mode: AcquisitionMode,
    pub history_capacity: usize,
    /// Empty means "first layer that arrives".
    pub active_cost_layer: String,
    pub use_custom_cost_limits: bool,
    pub cost_lower_limit: f32,
    pub cost_upper_limit: f32,
    pub cost_color_map: CostColorMap,
    pub topics: TopicNames,
    pub services: ServiceNames,
    pub render: RenderOptions,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            acquisition_mode: AcquisitionMode::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            active_cost_layer: String::new(),
            use_custom_cost_limits: false,
            cost_lower_limit: 0.0,
            cost_upper_limit: 1.0,
            cost_color_map: CostColorMap::default(),
            topics: TopicNames::default(),
            services: ServiceNames::default(),
            render: RenderOptions::default(),
        }
    }
}

impl DisplayConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DisplayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        let (lower, upper) = (self.cost_lower_limit, self.cost_upper_limit);
        if self.use_custom_cost_limits && !(lower.is_finite() && upper.is_finite() && lower < upper)
        {
            return Err(ConfigError::InvalidCostLimits { lower, upper });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = DisplayConfig::from_json_str(
            r#"{ "acquisition_mode": "Requesting", "history_capacity": 4,
                 "services": { "materials": "" } }"#,
        )
        .expect("valid config");

        assert_eq!(config.acquisition_mode, AcquisitionMode::Requesting);
        assert_eq!(config.history_capacity, 4);
        assert!(config.services.materials.is_empty());
        assert_eq!(config.services.geometry, "get_geometry");
        assert_eq!(config.topics, TopicNames::default());
        assert_eq!(config.render.display_type, DisplayType::FixedColor);
        assert!(!config.render.use_triangle_colors);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = DisplayConfig::from_json_str(r#"{ "history_capacity": 0 }"#);
        assert!(matches!(result, Err(ConfigError::InvalidCapacity)));
    }

    #[test]
    fn inverted_custom_limits_are_rejected_only_when_enabled() {
        let json = r#"{ "cost_lower_limit": 5.0, "cost_upper_limit": 1.0 }"#;
        assert!(DisplayConfig::from_json_str(json).is_ok());

        let json = r#"{ "use_custom_cost_limits": true,
                        "cost_lower_limit": 5.0, "cost_upper_limit": 1.0 }"#;
        assert!(matches!(
            DisplayConfig::from_json_str(json),
            Err(ConfigError::InvalidCostLimits { .. })
        ));
    }

    #[test]
    fn malformed_json_surfaces_parse_error() {
        assert!(matches!(
            DisplayConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn serialization_round_trips_through_json() {
        let mut config = DisplayConfig::default();
        config.cost_color_map = CostColorMap::RedGreen;
        config.render.display_type = DisplayType::VertexCosts;
        let json = config.to_json_pretty().expect("serializes");
        let parsed = DisplayConfig::from_json_str(&json).expect("parses");
        assert_eq!(parsed, config);
    }
}
