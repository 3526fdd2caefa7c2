use foldrun::engine::compilation::COMPILATION_INTERVAL;
use foldrun::engine::config::DatabasePreset;
use std::path::PathBuf;

pub struct DefaultsConfig {
    pub output_dir: PathBuf,
    pub cpus: usize,
    pub database_preset: DatabasePreset,
    pub multimer_ri_gap: i32,
    pub compilation_interval: usize,
    /// Where `params_<preset>.npz` is looked up when no parameters are given.
    pub params_dir: PathBuf,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            cpus: 4,
            database_preset: DatabasePreset::FullDbs,
            multimer_ri_gap: 200,
            compilation_interval: COMPILATION_INTERVAL,
            params_dir: ["openfold", "resources", "params"].iter().collect(),
        }
    }
}

impl DefaultsConfig {
    pub fn default_params_path(&self, preset: &str) -> PathBuf {
        self.params_dir.join(format!("params_{}.npz", preset))
    }
}
