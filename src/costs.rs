use crate::mesh::{CostLayer, MeshId, MeshSnapshot, Rgba};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const LUT_SIZE: usize = 256;

static RAINBOW_LUT: Lazy<Vec<Rgba>> = Lazy::new(|| build_lut(rainbow));
static RED_GREEN_LUT: Lazy<Vec<Rgba>> = Lazy::new(|| build_lut(red_green));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostColorMap {
    #[default]
    Rainbow,
    RedGreen,
}

impl CostColorMap {
    /// Color for a cost already normalized to `[0, 1]`.
    pub fn color(self, normalized: f32) -> Rgba {
        let lut: &[Rgba] = match self {
            CostColorMap::Rainbow => &RAINBOW_LUT,
            CostColorMap::RedGreen => &RED_GREEN_LUT,
        };
        let t = if normalized.is_nan() {
            0.0
        } else {
            normalized.clamp(0.0, 1.0)
        };
        lut[(t * (LUT_SIZE - 1) as f32).round() as usize]
    }
}

fn build_lut(map: fn(f32) -> Rgba) -> Vec<Rgba> {
    (0..LUT_SIZE)
        .map(|step| map(step as f32 / (LUT_SIZE - 1) as f32))
        .collect()
}

/// Blue for low costs through green and yellow to red for high costs.
fn rainbow(t: f32) -> Rgba {
    let hue = (1.0 - t) * 240.0;
    let sector = hue / 60.0;
    let x = 1.0 - (sector % 2.0 - 1.0).abs();
    let [r, g, b] = match sector as u32 {
        0 => [1.0, x, 0.0],
        1 => [x, 1.0, 0.0],
        2 => [0.0, 1.0, x],
        _ => [0.0, x, 1.0],
    };
    [r, g, b, 1.0]
}

fn red_green(t: f32) -> Rgba {
    [t, 1.0 - t, 0.0, 1.0]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostRange {
    pub lower: f32,
    pub upper: f32,
}

impl CostRange {
    pub fn new(lower: f32, upper: f32) -> Result<Self, CostSelectionError> {
        if !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(CostSelectionError::InvalidLimits { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// `[min, max]` over the finite costs, `None` when there are none.
    pub fn of(costs: &[f32]) -> Option<Self> {
        costs
            .par_iter()
            .copied()
            .filter(|cost| cost.is_finite())
            .fold(
                || None,
                |range: Option<(f32, f32)>, cost| match range {
                    Some((lower, upper)) => Some((lower.min(cost), upper.max(cost))),
                    None => Some((cost, cost)),
                },
            )
            .reduce(
                || None,
                |a, b| match (a, b) {
                    (Some((la, ua)), Some((lb, ub))) => Some((la.min(lb), ua.max(ub))),
                    (a, None) => a,
                    (None, b) => b,
                },
            )
            .map(|(lower, upper)| Self { lower, upper })
    }

    /// Clamps and scales into `[0, 1]`. A degenerate range maps to 0.
    pub fn normalize(self, cost: f32) -> f32 {
        if cost.is_nan() {
            return 0.0;
        }
        let span = self.upper - self.lower;
        if span <= 0.0 {
            return 0.0;
        }
        ((cost - self.lower) / span).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CostSelectionError {
    #[error("no cost layer named '{0}' on the current mesh")]
    UnknownLayer(String),
    #[error("invalid cost limits [{lower}, {upper}]")]
    InvalidLimits { lower: f32, upper: f32 },
}

/// Normalized costs and colors for one snapshot's active layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CostOverlay {
    pub layer: String,
    pub range: CostRange,
    pub normalized: Vec<f32>,
    pub colors: Vec<Rgba>,
}

#[derive(Debug, Clone)]
struct AutoRange {
    mesh_id: MeshId,
    layer: String,
    stamp_ms: u64,
    range: Option<CostRange>,
}

impl AutoRange {
    fn matches(&self, layer: &CostLayer) -> bool {
        self.mesh_id == layer.mesh_id && self.layer == layer.name && self.stamp_ms == layer.stamp_ms
    }
}

#[derive(Debug, Clone)]
pub struct CostLayerSelector {
    active: Option<String>,
    use_custom: bool,
    custom: CostRange,
    color_map: CostColorMap,
    auto: Option<AutoRange>,
}

impl Default for CostLayerSelector {
    fn default() -> Self {
        Self {
            active: None,
            use_custom: false,
            custom: CostRange {
                lower: 0.0,
                upper: 1.0,
            },
            color_map: CostColorMap::default(),
            auto: None,
        }
    }
}

impl CostLayerSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a layer name from configuration without checking it exists.
    pub fn with_preferred_layer(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.active = (!name.is_empty()).then_some(name);
        self
    }

    pub fn active_layer(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn color_map(&self) -> CostColorMap {
        self.color_map
    }

    pub fn set_color_map(&mut self, color_map: CostColorMap) {
        self.color_map = color_map;
    }

    pub fn uses_custom_limits(&self) -> bool {
        self.use_custom
    }

    pub fn custom_limits(&self) -> CostRange {
        self.custom
    }

    /// Activates `name` if the snapshot carries such a layer; otherwise the
    /// previous selection stays.
    pub fn select_layer(
        &mut self,
        name: &str,
        snapshot: Option<&MeshSnapshot>,
    ) -> Result<(), CostSelectionError> {
        let layer = snapshot
            .and_then(|snapshot| snapshot.cost_layer(name))
            .ok_or_else(|| CostSelectionError::UnknownLayer(name.to_string()))?;
        self.active = Some(name.to_string());
        self.auto = Some(Self::measure(layer));
        log::debug!("[costs] active cost layer is now '{name}'");
        Ok(())
    }

    /// Picks the first layer on `snapshot` when no layer is active.
    pub fn adopt_default(&mut self, snapshot: &MeshSnapshot) -> bool {
        // a configured preference that has not shown up yet stays in place
        if self.active.is_some() {
            return false;
        }
        match snapshot.cost_layers().first() {
            Some(layer) => {
                self.active = Some(layer.name.clone());
                self.auto = Some(Self::measure(layer));
                true
            }
            None => false,
        }
    }

    /// Recomputes auto limits from the active layer as `snapshot` holds it
    /// now. Always re-measures: a replacement may reuse the previous stamp.
    pub fn refresh(&mut self, snapshot: &MeshSnapshot) {
        let Some(layer) = self
            .active
            .as_deref()
            .and_then(|name| snapshot.cost_layer(name))
        else {
            return;
        };
        self.auto = Some(Self::measure(layer));
    }

    pub fn set_use_custom_limits(&mut self, enabled: bool) {
        self.use_custom = enabled;
    }

    pub fn set_custom_limits(&mut self, lower: f32, upper: f32) -> Result<(), CostSelectionError> {
        self.custom = CostRange::new(lower, upper)?;
        Ok(())
    }

    /// Limits applied to `layer`: the custom range when enabled, otherwise
    /// the layer's own `[min, max]`.
    pub fn limits_for(&self, layer: &CostLayer) -> Option<CostRange> {
        if self.use_custom {
            return Some(self.custom);
        }
        match &self.auto {
            Some(auto) if auto.matches(layer) => auto.range,
            _ => CostRange::of(&layer.costs),
        }
    }

    pub fn overlay(&self, snapshot: &MeshSnapshot) -> Option<CostOverlay> {
        let layer = snapshot.cost_layer(self.active.as_deref()?)?;
        let range = self.limits_for(layer)?;
        let normalized: Vec<f32> = layer
            .costs
            .par_iter()
            .map(|cost| range.normalize(*cost))
            .collect();
        let color_map = self.color_map;
        let colors = normalized
            .par_iter()
            .map(|t| color_map.color(*t))
            .collect();
        Some(CostOverlay {
            layer: layer.name.clone(),
            range,
            normalized,
            colors,
        })
    }

    /// Forgets cached limits and any layer adopted at runtime. `preferred`
    /// is the configured layer name; empty means none.
    pub fn clear(&mut self, preferred: &str) {
        self.auto = None;
        self.active = (!preferred.is_empty()).then(|| preferred.to_string());
    }

    fn measure(layer: &CostLayer) -> AutoRange {
        AutoRange {
            mesh_id: layer.mesh_id.clone(),
            layer: layer.name.clone(),
            stamp_ms: layer.stamp_ms,
            range: CostRange::of(&layer.costs),
        }
    }
}
