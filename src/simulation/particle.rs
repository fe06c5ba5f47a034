use crate::{floating_type_mod::FT, V2};

fn zero() -> V2 {
    V2::zeros()
}

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        #[derive(Debug, Clone)]
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn swap(&mut self, i: usize, j: usize) {
                $(
                    self.$field_name.swap(i, j);
                )*
            }

            pub fn truncate(&mut self, len: usize) {
                $(
                    self.$field_name.truncate(len);
                )*
            }

            pub fn extend(&mut self, num_elements: usize) {
                $(
                    self.$field_name.extend((0..num_elements).map::<$field_type, _>(|_| $default_value));
                )*
            }

            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub position: Vec<V2> | zero(),
        pub velocity: Vec<V2> | zero(),

        // velocity after non-pressure forces (v*)
        pub intermediate_velocity: Vec<V2> | zero(),

        pub density: Vec<FT> | 0.,
        pub rest_density: Vec<FT> | 0.,
        pub pressure: Vec<FT> | 0.,
        pub pressure_next_iter: Vec<FT> | 0.,
        pub diameter: Vec<FT> | 0.,
        pub mass: Vec<FT> | 0.,
        pub is_boundary: Vec<bool> | false,

        // IISPH diagonal element, source term and pressure laplacian
        pub aii: Vec<FT> | 0.,
        pub source_term: Vec<FT> | 0.,
        pub laplacian: Vec<FT> | 0.,

        pub cfl: Vec<FT> | 0.,

        // in percent of the rest density
        pub density_error: Vec<FT> | 0.,
        pub estimated_compression: Vec<FT> | 0.,

        pub pressure_accel: Vec<V2> | zero(),
        pub viscosity_accel: Vec<V2> | zero(),
        pub gravity_accel: Vec<V2> | zero(),
    }
}

impl ParticleVec {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Appends a particle at rest and returns its index.
    pub fn push(&mut self, position: V2, velocity: V2, diameter: FT, rest_density: FT, is_boundary: bool) -> usize {
        let i = self.len();
        self.extend(1);
        self.position[i] = position;
        self.velocity[i] = velocity;
        self.intermediate_velocity[i] = velocity;
        self.diameter[i] = diameter;
        self.rest_density[i] = rest_density;
        self.density[i] = rest_density;
        self.mass[i] = diameter * diameter * rest_density;
        self.is_boundary[i] = is_boundary;
        i
    }

    /// Removes particle `i`, the last particle takes its index.
    pub fn swap_remove(&mut self, i: usize) {
        let last = self.len() - 1;
        self.swap(i, last);
        self.truncate(last);
    }

    pub fn acceleration(&self, i: usize) -> V2 {
        self.pressure_accel[i] + self.non_pressure_accel(i)
    }

    pub fn non_pressure_accel(&self, i: usize) -> V2 {
        self.viscosity_accel[i] + self.gravity_accel[i]
    }

    pub fn num_boundary_particles(&self) -> usize {
        self.is_boundary.iter().filter(|&&b| b).count()
    }

    pub fn num_fluid_particles(&self) -> usize {
        self.len() - self.num_boundary_particles()
    }

    pub fn fluid_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.is_boundary.iter().enumerate().filter(|&(_, &b)| !b).map(|(i, _)| i)
    }

    pub fn boundary_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.is_boundary.iter().enumerate().filter(|&(_, &b)| b).map(|(i, _)| i)
    }

    pub fn total_fluid_mass(&self) -> FT {
        self.fluid_indices().map(|i| self.mass[i]).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::ParticleVec;
    use crate::{vec2f, V2};

    #[test]
    fn push_derives_mass_from_diameter() {
        let mut particles = ParticleVec::default(0);
        let i = particles.push(vec2f(1., 2.), V2::zeros(), 10., 0.3, false);
        assert_eq!(i, 0);
        assert!((particles.mass[0] - 30.).abs() < 1e-4);
        assert_eq!(particles.density[0], 0.3);
    }

    #[test]
    fn swap_remove_moves_last_particle() {
        let mut particles = ParticleVec::default(0);
        for k in 0..4 {
            particles.push(vec2f(k as _, 0.), V2::zeros(), 1., 1., k == 2);
        }
        particles.swap_remove(1);
        assert_eq!(particles.len(), 3);
        assert_eq!(particles.position[1], vec2f(3., 0.));
        assert_eq!(particles.num_boundary_particles(), 1);
        assert_eq!(particles.fluid_indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(particles.boundary_indices().collect::<Vec<_>>(), vec![2]);
    }
}
