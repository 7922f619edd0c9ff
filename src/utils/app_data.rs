use std::path::PathBuf;

const APP_NAME: &str = "substr-miner";
const CONFIG_FILE: &str = "config.json";

/// Default location of the user config file, if a config directory exists.
/// The file itself may be absent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_NAME).join(CONFIG_FILE))
}

/// Get the number of CPUs available
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
