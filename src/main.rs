/*
 * Headless runner: loads a settings file and a scene file, then steps the simulation
 * and logs solver statistics.
 *
 *     sph-sandbox run settings.yaml scene.yaml --steps 500 --log-every 10
 */

fn main() {
    if let Err(e) = sph_sandbox::start() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
