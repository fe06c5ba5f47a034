use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    body::{ellipse_polygon, fluid_block, fluid_disc, polygon_outline, rectangle_polygon, BlockLayout},
    error::SceneError,
    floating_type_mod::FT,
    vec2f, FluidSimulation, V2,
};

fn v2(p: [FT; 2]) -> V2 {
    vec2f(p[0], p[1])
}

/// Rectangular block of fluid particles. `min` is the position of the first particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFluidBlock {
    pub min: [FT; 2],
    /// number of particles along x and y
    pub count: [usize; 2],
    #[serde(default)]
    pub staggered: bool,
    /// random offset in multiples of the particle diameter
    #[serde(default)]
    pub jitter: FT,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub velocity: [FT; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFluidDisc {
    pub center: [FT; 2],
    pub radius: FT,
    #[serde(default)]
    pub velocity: [FT; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SceneShape {
    Polygon { vertices: Vec<[FT; 2]> },
    Rectangle { center: [FT; 2], size: [FT; 2] },
    Ellipse { center: [FT; 2], radii: [FT; 2] },
}

impl SceneShape {
    fn center(&self) -> V2 {
        match self {
            SceneShape::Polygon { vertices } => {
                let sum = vertices.iter().fold(V2::zeros(), |acc, &p| acc + v2(p));
                sum / FT::max(vertices.len() as FT, 1.)
            }
            SceneShape::Rectangle { center, .. } | SceneShape::Ellipse { center, .. } => v2(*center),
        }
    }
}

/**
 * Boundary particles along the outline of a shape.
 *
 * Rectangles and ellipses can be thickened with additional layers, every layer is grown
 * outwards by one particle diameter. A non-zero `rotation_speed` turns the shape into a
 * body rotating around `pivot` (the shape center by default).
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneBody {
    pub shape: SceneShape,
    #[serde(default = "SceneBody::default_layers")]
    pub layers: usize,
    #[serde(default)]
    pub rotation_speed: FT,
    #[serde(default)]
    pub pivot: Option<[FT; 2]>,
}

impl SceneBody {
    fn default_layers() -> usize {
        1
    }

    pub fn positions(&self, diameter: FT) -> Result<Vec<V2>, SceneError> {
        if self.layers == 0 {
            return Err(SceneError::Invalid("a body needs at least one layer".into()));
        }

        let mut positions = Vec::new();
        for layer in 0..self.layers {
            let grow = layer as FT * diameter;
            let polygon = match &self.shape {
                SceneShape::Polygon { vertices } => {
                    if self.layers > 1 {
                        return Err(SceneError::Invalid(
                            "multiple layers are only supported for rectangles and ellipses".into(),
                        ));
                    }
                    if vertices.is_empty() {
                        return Err(SceneError::Invalid("polygon without vertices".into()));
                    }
                    vertices.iter().map(|&p| v2(p)).collect()
                }
                SceneShape::Rectangle { center, size } => {
                    rectangle_polygon(v2(*center), v2(*size) * 0.5 + vec2f(grow, grow))
                }
                SceneShape::Ellipse { center, radii } => {
                    ellipse_polygon(v2(*center), v2(*radii) + vec2f(grow, grow), diameter)
                }
            };
            positions.extend(polygon_outline(&polygon, diameter));
        }
        Ok(positions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub particle_diameter: FT,
    pub rest_density: FT,
    pub fluid_blocks: Vec<SceneFluidBlock>,
    pub fluid_discs: Vec<SceneFluidDisc>,
    pub bodies: Vec<SceneBody>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig {
            particle_diameter: 10.,
            rest_density: 0.3,
            fluid_blocks: Vec::new(),
            fluid_discs: Vec::new(),
            bodies: Vec::new(),
        }
    }
}

impl SceneConfig {
    pub fn from_yaml(yaml: &str) -> Result<SceneConfig, SceneError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn build(&self) -> Result<FluidSimulation, SceneError> {
        let d = self.particle_diameter;
        if !(d > 0.) || !d.is_finite() {
            return Err(SceneError::Invalid(format!("particle diameter has to be positive, got {}", d)));
        }
        if !(self.rest_density > 0.) || !self.rest_density.is_finite() {
            return Err(SceneError::Invalid(format!(
                "rest density has to be positive, got {}",
                self.rest_density
            )));
        }

        let mut sim = FluidSimulation::new(d, self.rest_density);

        for body in &self.bodies {
            let positions = body.positions(d)?;
            if body.rotation_speed != 0. {
                let pivot = body.pivot.map(v2).unwrap_or_else(|| body.shape.center());
                sim.add_body(&positions, pivot, body.rotation_speed);
            } else {
                for p in positions {
                    sim.add_boundary_particle(p);
                }
            }
        }

        for block in &self.fluid_blocks {
            let layout = BlockLayout {
                staggered: block.staggered,
                jitter: block.jitter,
                seed: block.seed,
            };
            for p in fluid_block(v2(block.min), (block.count[0], block.count[1]), d, layout) {
                sim.add_fluid_particle(p, v2(block.velocity));
            }
        }

        for disc in &self.fluid_discs {
            if !(disc.radius >= 0.) {
                return Err(SceneError::Invalid(format!("disc radius has to be positive, got {}", disc.radius)));
            }
            for p in fluid_disc(v2(disc.center), disc.radius, d) {
                sim.add_fluid_particle(p, v2(disc.velocity));
            }
        }

        info!(
            fluid_particles = sim.num_fluid_particles(),
            boundary_particles = sim.num_boundary_particles(),
            bodies = sim.bodies().len(),
            "scene built"
        );

        Ok(sim)
    }
}

pub fn load_scene(path: impl AsRef<Path>) -> Result<SceneConfig, SceneError> {
    let yaml = std::fs::read_to_string(path)?;
    SceneConfig::from_yaml(&yaml)
}
