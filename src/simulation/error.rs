use std::fmt;

use crate::floating_type_mod::FT;

/// A numerical invariant was violated during a simulation step.
///
/// All of these point to a broken neighborhood or an unstable parameter set. The step
/// that produced the error must not be trusted.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    InvalidDensity { particle: usize, density: FT },
    InvalidPressure { particle: usize, pressure: FT },
    InvalidAcceleration { particle: usize },
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::InvalidDensity { particle, density } => {
                write!(f, "particle {} has invalid density {}", particle, density)
            }
            SimulationError::InvalidPressure { particle, pressure } => {
                write!(f, "particle {} has invalid pressure {}", particle, pressure)
            }
            SimulationError::InvalidAcceleration { particle } => {
                write!(f, "particle {} has a non-finite pressure acceleration", particle)
            }
        }
    }
}

impl std::error::Error for SimulationError {}

/// Loading or building a scene failed.
#[derive(Debug)]
pub enum SceneError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::Io(e) => write!(f, "io error: {}", e),
            SceneError::Yaml(e) => write!(f, "yaml error: {}", e),
            SceneError::Invalid(msg) => write!(f, "invalid scene: {}", msg),
        }
    }
}

impl std::error::Error for SceneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SceneError::Io(e) => Some(e),
            SceneError::Yaml(e) => Some(e),
            SceneError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for SceneError {
    fn from(e: std::io::Error) -> Self {
        SceneError::Io(e)
    }
}

impl From<serde_yaml::Error> for SceneError {
    fn from(e: serde_yaml::Error) -> Self {
        SceneError::Yaml(e)
    }
}

/// Top level error of the command line runner.
#[derive(Debug)]
pub enum RunError {
    /// a command line value could not be parsed
    Argument(String),
    Scene(SceneError),
    Simulation { step: usize, source: SimulationError },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Argument(msg) => write!(f, "invalid argument: {}", msg),
            RunError::Scene(e) => write!(f, "{}", e),
            RunError::Simulation { step, source } => write!(f, "simulation failed in step {}: {}", step, source),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Argument(_) => None,
            RunError::Scene(e) => Some(e),
            RunError::Simulation { source, .. } => Some(source),
        }
    }
}

impl From<SceneError> for RunError {
    fn from(e: SceneError) -> Self {
        RunError::Scene(e)
    }
}
