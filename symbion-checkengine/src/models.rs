/*!
MODELS - Identifiants partagés par tout le moteur de checks

RÔLE : noms d'hôtes, de sections, de plugins et clés de providers.
Tous les types sont immuables et utilisables comme clés de map.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Newtype de nom, sans contrainte sur le contenu
macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

name_type!(
    /// Nom d'un hôte surveillé (hôte réel, noeud ou cluster virtuel)
    HostName
);
name_type!(
    /// Nom d'une section brute telle qu'elle arrive de l'agent (ex: "if64")
    SectionName
);
name_type!(
    /// Nom d'une section parsée, c'est ce que les plugins de check demandent
    ParsedSectionName
);
name_type!(
    /// Nom d'une période de temps configurée (ex: "workhours", "24X7")
    TimeperiodName
);

/// Description d'un service, unique par hôte
pub type ServiceName = String;

/// Item optionnel d'un service (ex: "/var" pour un check de filesystem)
pub type Item = Option<String>;

/// Origine des données d'un hôte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Host,
    Management,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Host => f.write_str("HOST"),
            SourceType::Management => f.write_str("MANAGEMENT"),
        }
    }
}

/// Clé d'un provider : une instance de source pour un hôte
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostKey {
    pub hostname: HostName,
    pub source_type: SourceType,
}

impl HostKey {
    pub fn new(hostname: impl Into<HostName>, source_type: SourceType) -> Self {
        Self {
            hostname: hostname.into(),
            source_type,
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.source_type)
    }
}

/// Nom d'un plugin de check. Le préfixe `mgmt_` désigne la variante
/// qui lit les données de la carte de management.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckPluginName(String);

impl CheckPluginName {
    pub const MANAGEMENT_PREFIX: &'static str = "mgmt_";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_management_name(&self) -> bool {
        self.0.starts_with(Self::MANAGEMENT_PREFIX)
    }

    pub fn create_management_name(&self) -> Self {
        if self.is_management_name() {
            return self.clone();
        }
        Self(format!("{}{}", Self::MANAGEMENT_PREFIX, self.0))
    }

    pub fn create_basic_name(&self) -> Self {
        match self.0.strip_prefix(Self::MANAGEMENT_PREFIX) {
            Some(basic) => Self(basic.to_string()),
            None => self.clone(),
        }
    }

    /// Type de source dont ce plugin lit les sections
    pub fn source_type(&self) -> SourceType {
        if self.is_management_name() {
            SourceType::Management
        } else {
            SourceType::Host
        }
    }
}

impl fmt::Display for CheckPluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckPluginName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

name_type!(
    /// Nom d'un plugin d'inventaire
    InventoryPluginName
);

/// Identité d'un service pour le namespacing du value store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId {
    pub name: CheckPluginName,
    pub item: Item,
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => write!(f, "{}/{}", self.name, item),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Backend SNMP utilisé pour l'hôte, reporté dans les crash reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnmpBackend {
    #[default]
    Inline,
    Classic,
    StoredWalk,
}

/// Sélection des plugins à exécuter pour ce run ("cmk --plugins=...")
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunPluginNames {
    #[default]
    Everything,
    Only(BTreeSet<CheckPluginName>),
}

impl RunPluginNames {
    pub fn only<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<CheckPluginName>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &CheckPluginName) -> bool {
        match self {
            Self::Everything => true,
            Self::Only(names) => names.contains(name),
        }
    }

    pub fn is_everything(&self) -> bool {
        matches!(self, Self::Everything)
    }
}

impl From<String> for CheckPluginName {
    fn from(value: String) -> Self {
        Self(value)
    }
}
