//! Services as configured for a host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{CheckPluginName, Item, ServiceId, ServiceName, TimeperiodName};
use crate::parameters::TimespecificParameters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredService {
    pub check_plugin_name: CheckPluginName,
    #[serde(default)]
    pub item: Item,
    pub description: ServiceName,
    #[serde(default)]
    pub parameters: TimespecificParameters,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub is_enforced: bool,
    /// Période de check, `None` = toujours
    #[serde(default)]
    pub check_period: Option<TimeperiodName>,
}

impl ConfiguredService {
    pub fn new(
        check_plugin_name: impl Into<CheckPluginName>,
        item: Item,
        description: impl Into<ServiceName>,
    ) -> Self {
        Self {
            check_plugin_name: check_plugin_name.into(),
            item,
            description: description.into(),
            parameters: TimespecificParameters::default(),
            labels: BTreeMap::new(),
            is_enforced: false,
            check_period: None,
        }
    }

    /// Identité utilisée pour le namespace du value store
    pub fn id(&self) -> ServiceId {
        ServiceId {
            name: self.check_plugin_name.clone(),
            item: self.item.clone(),
        }
    }
}
