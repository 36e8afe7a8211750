/*!
CONFIG - Réglages du moteur chargés depuis YAML

- `ExitSpec` : états utilisés pour les problèmes de niveau hôte
  (données manquantes, source vide, exception...)
- `EngineSettings` : mode debug, emplacements du value store et des crashs
*/

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::checkresults::State;
use crate::errors::EngineError;
use crate::models::SnmpBackend;

/// États à appliquer aux problèmes détectés sur l'hôte
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitSpec {
    pub missing_sections: State,
    /// (regex sur le nom du plugin, état) ; le premier motif qui correspond gagne
    pub specific_missing_sections: Vec<(String, State)>,
    pub exception: State,
    pub empty_output: State,
    pub connection: State,
    pub timeout: State,
}

impl Default for ExitSpec {
    fn default() -> Self {
        Self {
            missing_sections: State::Warn,
            specific_missing_sections: Vec::new(),
            exception: State::Unknown,
            empty_output: State::Crit,
            connection: State::Crit,
            timeout: State::Crit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Laisse remonter les crashs de plugins au lieu de les contenir
    pub debug: bool,
    pub value_store_path: Option<PathBuf>,
    pub crash_dir: Option<PathBuf>,
    pub snmp_backend: SnmpBackend,
}

/// Lit un fichier YAML en type de configuration
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, EngineError> {
    let content = fs::read_to_string(path.as_ref())?;
    if content.trim().is_empty() {
        return Err(EngineError::Config(format!(
            "{} is empty",
            path.as_ref().display()
        )));
    }
    Ok(serde_yaml::from_str(&content)?)
}
