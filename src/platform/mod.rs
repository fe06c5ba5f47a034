use std::path::Path;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing::{info, Level};

use crate::{
    error::{RunError, SceneError},
    floating_type_mod::FT,
    scene::load_scene,
    simulation_parameters::SimulationSettings,
};

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

pub fn start() -> Result<(), RunError> {
    let matches = App::new("SPH Sandbox")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation parameters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("STEPS")
                        .long("steps")
                        .short("n")
                        .takes_value(true)
                        .default_value("1000")
                        .help("Number of time steps to simulate"),
                )
                .arg(
                    Arg::with_name("MAX_SECONDS")
                        .long("max-seconds")
                        .short("s")
                        .required(false)
                        .takes_value(true)
                        .help("Stop simulation after the given amount of simulated seconds"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite single values of the simulation parameters"),
                )
                .arg(
                    Arg::with_name("LOG_EVERY")
                        .long("log-every")
                        .takes_value(true)
                        .default_value("10")
                        .help("Log solver statistics every n steps"),
                ),
        )
        .get_matches();

    init_logging(matches.occurrences_of("v"));

    match matches.subcommand_matches("run") {
        Some(run_matches) => run(run_matches),
        None => Ok(()),
    }
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_target(false).with_max_level(level).init();
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, RunError> {
    match matches.value_of(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| RunError::Argument(format!("{} has an invalid value `{}`", name, value))),
        None => Ok(None),
    }
}

fn run(run_matches: &ArgMatches) -> Result<(), RunError> {
    let settings_path = run_matches
        .value_of("SIMULATION_CONFIG")
        .ok_or_else(|| RunError::Argument("missing simulation config".into()))?;
    let scene_path = run_matches
        .value_of("SCENE_CONFIG")
        .ok_or_else(|| RunError::Argument("missing scene config".into()))?;

    let settings = load_settings(settings_path, run_matches.value_of("OVERWRITE_CONFIG_FILE"))?;
    info!("{:?}", settings);

    let scene_config = load_scene(scene_path)?;
    let mut fluid_simulation = scene_config.build()?;

    let steps: usize = parse_arg(run_matches, "STEPS")?.unwrap_or(1000);
    let max_seconds: Option<FT> = parse_arg(run_matches, "MAX_SECONDS")?;
    let log_every: usize = parse_arg::<usize>(run_matches, "LOG_EVERY")?.unwrap_or(10).max(1);

    for step in 0..steps {
        if let Some(max_seconds) = max_seconds {
            if fluid_simulation.time() >= max_seconds {
                break;
            }
        }

        let state = fluid_simulation
            .step(&settings)
            .map_err(|source| RunError::Simulation { step, source })?;

        if step % log_every == 0 {
            info!(step, time = fluid_simulation.time(), "{}", state);
        }
    }

    info!(
        steps = fluid_simulation.step_number(),
        time = fluid_simulation.time(),
        "simulation finished"
    );
    Ok(())
}

/// Reads the settings file and patches it with the top level keys of the override file.
pub fn load_settings(path: impl AsRef<Path>, overwrite_path: Option<&str>) -> Result<SimulationSettings, SceneError> {
    let yaml = std::fs::read_to_string(path)?;
    let overrides = match overwrite_path {
        Some(overwrite_path) => Some(std::fs::read_to_string(overwrite_path)?),
        None => None,
    };
    parse_settings(&yaml, overrides.as_deref())
}

fn parse_settings(yaml: &str, overrides: Option<&str>) -> Result<SimulationSettings, SceneError> {
    let mut settings_serde = if yaml.trim().is_empty() {
        serde_yaml::Value::Null
    } else {
        serde_yaml::from_str(yaml)?
    };
    if settings_serde.is_null() {
        settings_serde = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }

    if let Some(overrides) = overrides {
        let overrides: serde_yaml::Mapping = serde_yaml::from_str(overrides)?;
        let mapping = settings_serde
            .as_mapping_mut()
            .ok_or_else(|| SceneError::Invalid("simulation parameters are not a mapping".into()))?;
        for (k, v) in overrides.into_iter() {
            mapping.insert(k, v);
        }
    }

    Ok(serde_yaml::from_value(settings_serde)?)
}

#[cfg(test)]
mod tests {
    use super::parse_settings;
    use crate::{
        error::SceneError,
        simulation_parameters::{BoundaryHandling, SimulationMethod, SimulationSettings},
    };

    #[test]
    fn overrides_replace_and_add_keys() {
        let settings = parse_settings(
            "simulation_method: SESPH\ntime_step: 0.05\n",
            Some("simulation_method: IISPH\nboundary_handling: Zero\n"),
        )
        .unwrap();
        assert_eq!(settings.simulation_method, SimulationMethod::IISPH);
        assert_eq!(settings.boundary_handling, BoundaryHandling::Zero);
        assert_eq!(settings.time_step, 0.05);
    }

    #[test]
    fn empty_settings_use_defaults() {
        let settings = parse_settings("", None).unwrap();
        assert_eq!(settings, SimulationSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            parse_settings("time_stpe: 0.1\n", None),
            Err(SceneError::Yaml(_))
        ));
        assert!(matches!(
            parse_settings("- 1\n- 2\n", Some("gravity: 1\n")),
            Err(SceneError::Invalid(_))
        ));
    }
}
