use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, particle::ParticleVec, vec3f, V};

pub type Color = V<FT, 3>;

pub struct ColorMap {
    insertions: Vec<(FT, Color)>,
}

impl ColorMap {
    /// An empty list of color stops maps everything to black.
    pub fn new(mut insertions: Vec<(FT, Color)>) -> Self {
        insertions.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { insertions }
    }

    pub fn get(&self, x: FT) -> Color {
        let (first, last) = match (self.insertions.first(), self.insertions.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Color::zeros(),
        };
        if x.is_nan() || x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }

        for w in self.insertions.windows(2) {
            let ((x0, c0), (x1, c1)) = (w[0], w[1]);
            if x >= x0 && x <= x1 {
                if x1 <= x0 {
                    return c1;
                }
                let interp = (x - x0) / (x1 - x0);
                return c0 + interp * (c1 - c0);
            }
        }

        last.1
    }

    pub fn get_u8(&self, x: FT) -> V<u8, 3> {
        self.get(x).map(|f| (f.clamp(0., 1.) * 255.) as u8)
    }

    pub fn get_f32(&self, x: FT) -> V<f32, 3> {
        self.get(x).map(|f| f as f32)
    }

    pub fn color_stops(&self) -> &[(FT, Color)] {
        &self.insertions
    }
}

// https://www.kennethmoreland.com/color-advice/
pub fn color_map_viridis(min: FT, max: FT) -> ColorMap {
    const STOPS: [[f64; 3]; 16] = [
        [0.2670039853213788, 0.0048725657145795975, 0.32941506855247793],
        [0.28265591676374746, 0.10019440706631136, 0.42215967285462885],
        [0.27713381181214125, 0.18522747944269774, 0.4898983578428951],
        [0.25393482507335086, 0.26525311670734747, 0.529983099667603],
        [0.22198891605799553, 0.33915975136273824, 0.5487520417750932],
        [0.19063051802725675, 0.4070603881536437, 0.5560891205440711],
        [0.1636245598287687, 0.47113199888460483, 0.5581480982786068],
        [0.13914656229528236, 0.5338106140906136, 0.555298125858835],
        [0.12056429075653713, 0.5964211612480832, 0.5436109978665574],
        [0.1346914034616326, 0.6586347623899736, 0.5176490803131216],
        [0.2080291781284243, 0.7186993731402823, 0.47287333975819085],
        [0.32779655496333804, 0.7739788075712202, 0.40663965647349865],
        [0.47750397699915853, 0.8214424087022711, 0.3181950138984179],
        [0.6472561782044223, 0.8583980753432965, 0.2098615478515251],
        [0.8249409891695173, 0.8847181273467387, 0.10621658195896774],
        [0.9932481489335602, 0.9061547634208059, 0.14393594366968385],
    ];
    let n = (STOPS.len() - 1) as FT;
    ColorMap::new(
        STOPS
            .iter()
            .enumerate()
            .map(|(k, c)| {
                (
                    min + (max - min) * (k as FT / n),
                    vec3f(c[0] as FT, c[1] as FT, c[2] as FT),
                )
            })
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualizedAttribute {
    Velocity,
    DensityError,
    Pressure,
    Cfl,
}

impl VisualizedAttribute {
    fn value(&self, i: usize, particles: &ParticleVec) -> FT {
        match self {
            Self::Velocity => particles.velocity[i].norm(),
            Self::DensityError => particles.density_error[i],
            Self::Pressure => particles.pressure[i],
            Self::Cfl => particles.cfl[i],
        }
    }

    /// The color map for this attribute. `max_value` is the largest value of the attribute
    /// in the current frame and only used for the pressure.
    pub fn color_map(&self, max_value: FT) -> ColorMap {
        match self {
            Self::Velocity => color_map_viridis(0., 4.),
            Self::DensityError => ColorMap::new(vec![
                (-10., vec3f(0., 0., 1.)), //
                (0., vec3f(1., 1., 1.)),
                (1., vec3f(1., 0., 0.)),
            ]),
            Self::Pressure => ColorMap::new(vec![
                (0., vec3f(1., 1., 1.)), //
                (FT::max(max_value, 1e-6), vec3f(1., 0., 0.)),
            ]),
            Self::Cfl => ColorMap::new(vec![
                (0., vec3f(0., 1., 0.)), //
                (0.5, vec3f(1., 1., 0.)),
                (1., vec3f(1., 0., 0.)),
            ]),
        }
    }
}

pub const BOUNDARY_COLOR: [f32; 3] = [0.5, 0.5, 0.5];

/// One RGB color per particle. Boundary particles are drawn in `BOUNDARY_COLOR`.
pub fn particle_colors(particles: &ParticleVec, attr: VisualizedAttribute) -> Vec<V<f32, 3>> {
    let max_value = particles
        .fluid_indices()
        .map(|i| attr.value(i, particles))
        .fold(0., FT::max);
    let color_map = attr.color_map(max_value);

    (0..particles.len())
        .map(|i| {
            if particles.is_boundary[i] {
                BOUNDARY_COLOR.into()
            } else {
                color_map.get_f32(attr.value(i, particles))
            }
        })
        .collect()
}
