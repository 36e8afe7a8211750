/*!
KWARGS - Résolution des sections passées à une fonction de check

RÔLE :
Pour un service, trouver dans le `ProviderRegistry` le contenu de chaque
section déclarée par le plugin :
- hôte simple : `section -> contenu | None`
- cluster : `noeud -> (section -> contenu | None)`, pour les noeuds qui
  possèdent le service

Une résolution vide est signalée par un `ServiceCheckResult` "pas de
données" : l'appelant ne doit pas appeler le plugin dans ce cas.

FRAÎCHEUR :
Seules les sections effectivement résolues contribuent au `CacheInfo`
agrégé (récupération la plus ancienne, âge max le plus grand).
*/

use std::collections::BTreeMap;
use tracing::trace;

use crate::checkresults::ServiceCheckResult;
use crate::models::{HostKey, HostName, ParsedSectionName, SourceType};
use crate::parser::CacheInfo;
use crate::plugins::SectionData;
use crate::sectionparser::ProviderRegistry;
use crate::services::ConfiguredService;

/// Hôte effectif d'un service de noeud : `(noeud, description) -> hôte`
pub type EffectiveHostFn<'a> = dyn Fn(&HostName, &str) -> HostName + 'a;

#[derive(Debug, Clone, PartialEq)]
pub enum SectionKwargs {
    Host(SectionData),
    Cluster(BTreeMap<HostName, SectionData>),
}

impl SectionKwargs {
    pub fn is_empty(&self) -> bool {
        match self {
            SectionKwargs::Host(sections) => sections.is_empty(),
            SectionKwargs::Cluster(nodes) => nodes.is_empty(),
        }
    }
}

/// Sections résolues d'un service et leur fraîcheur
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringData {
    pub sections: SectionKwargs,
    pub cache_info: Option<CacheInfo>,
}

/// Description de l'hôte en cours de check
#[derive(Debug, Clone, Copy)]
pub struct HostTopology<'a> {
    pub host_name: &'a HostName,
    pub is_cluster: bool,
    pub cluster_nodes: &'a [HostName],
}

/// Sections d'un `HostKey`. Map vide si aucune section déclarée n'a de contenu.
pub fn get_section_kwargs(
    providers: &ProviderRegistry,
    host_key: &HostKey,
    sections: &[ParsedSectionName],
    cache_infos: &mut Vec<CacheInfo>,
) -> SectionData {
    let Some(provider) = providers.get(host_key) else {
        trace!("[kwargs] no provider for {}", host_key);
        return SectionData::new();
    };

    let mut used = Vec::new();
    let kwargs: SectionData = sections
        .iter()
        .map(|name| {
            let resolved = provider.resolve(name);
            if let Some(info) = resolved.as_ref().and_then(|r| r.cache_info) {
                used.push(info);
            }
            (name.clone(), resolved.map(|r| r.parsed_data))
        })
        .collect();

    if kwargs.values().all(Option::is_none) {
        return SectionData::new();
    }
    cache_infos.extend(used);
    kwargs
}

/// Sections par noeud. Les noeuds sans données sont absents du résultat.
pub fn get_section_cluster_kwargs(
    providers: &ProviderRegistry,
    node_keys: &[HostKey],
    sections: &[ParsedSectionName],
    cache_infos: &mut Vec<CacheInfo>,
) -> BTreeMap<HostName, SectionData> {
    node_keys
        .iter()
        .filter_map(|key| {
            let node_kwargs = get_section_kwargs(providers, key, sections, cache_infos);
            (!node_kwargs.is_empty()).then(|| (key.hostname.clone(), node_kwargs))
        })
        .collect()
}

/// Noeuds qui possèdent le service. Si aucun ne le possède, tous les noeuds
/// sont utilisés (comportement historique conservé tel quel).
pub fn owning_nodes(
    topology: &HostTopology<'_>,
    description: &str,
    get_effective_host: &EffectiveHostFn<'_>,
) -> Vec<HostName> {
    let owners: Vec<HostName> = topology
        .cluster_nodes
        .iter()
        .filter(|node| &get_effective_host(*node, description) == topology.host_name)
        .cloned()
        .collect();
    if owners.is_empty() {
        topology.cluster_nodes.to_vec()
    } else {
        owners
    }
}

/// Sections d'un service, ou le résultat "pas de données" adapté
pub fn get_monitoring_data_kwargs(
    topology: &HostTopology<'_>,
    providers: &ProviderRegistry,
    service: &ConfiguredService,
    sections: &[ParsedSectionName],
    source_type: Option<SourceType>,
    get_effective_host: &EffectiveHostFn<'_>,
) -> Result<MonitoringData, ServiceCheckResult> {
    let source_type = source_type.unwrap_or_else(|| service.check_plugin_name.source_type());
    let mut cache_infos = Vec::new();

    if topology.is_cluster {
        let nodes = owning_nodes(topology, &service.description, get_effective_host);
        let node_keys: Vec<HostKey> = nodes
            .iter()
            .map(|node| HostKey::new(node.clone(), source_type))
            .collect();
        let kwargs = get_section_cluster_kwargs(providers, &node_keys, sections, &mut cache_infos);
        if kwargs.is_empty() {
            return Err(ServiceCheckResult::cluster_received_no_data(&nodes));
        }
        return Ok(MonitoringData {
            sections: SectionKwargs::Cluster(kwargs),
            cache_info: CacheInfo::aggregate(cache_infos),
        });
    }

    let host_key = HostKey::new(topology.host_name.clone(), source_type);
    let kwargs = get_section_kwargs(providers, &host_key, sections, &mut cache_infos);
    if kwargs.is_empty() {
        return Err(ServiceCheckResult::received_no_data());
    }
    Ok(MonitoringData {
        sections: SectionKwargs::Host(kwargs),
        cache_info: CacheInfo::aggregate(cache_infos),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::HostSections;
    use crate::sectionparser::{make_providers, SectionCatalog};
    use std::sync::Arc;

    fn providers(data: &[(&str, SourceType, &str, Option<CacheInfo>)]) -> ProviderRegistry {
        let mut grouped: BTreeMap<HostKey, HostSections> = BTreeMap::new();
        for (host, source_type, section, cache_info) in data {
            grouped
                .entry(HostKey::new(*host, *source_type))
                .or_default()
                .add_section((*section).into(), vec![vec!["1".into()]], *cache_info);
        }
        make_providers(&grouped, &Arc::new(SectionCatalog::default()))
    }

    fn sections(names: &[&str]) -> Vec<ParsedSectionName> {
        names.iter().map(|n| ParsedSectionName::new(*n)).collect()
    }

    fn same_host(node: &HostName, _description: &str) -> HostName {
        node.clone()
    }

    #[test]
    fn test_host_kwargs_and_used_cache_info() {
        let providers = providers(&[
            ("web01", SourceType::Host, "df", Some(CacheInfo::new(100, 60))),
            ("web01", SourceType::Host, "df_inodes", Some(CacheInfo::new(50, 600))),
        ]);
        let host = HostName::new("web01");
        let topology = HostTopology {
            host_name: &host,
            is_cluster: false,
            cluster_nodes: &[],
        };
        let service = ConfiguredService::new("df", Some("/".into()), "Filesystem /");

        let data = get_monitoring_data_kwargs(
            &topology,
            &providers,
            &service,
            &sections(&["df", "lvm"]),
            None,
            &same_host,
        )
        .unwrap();
        match &data.sections {
            SectionKwargs::Host(kwargs) => {
                assert!(kwargs[&ParsedSectionName::new("df")].is_some());
                assert!(kwargs[&ParsedSectionName::new("lvm")].is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        // df_inodes is present but unused
        assert_eq!(data.cache_info, Some(CacheInfo::new(100, 60)));
    }

    #[test]
    fn test_no_data_signals() {
        let providers = providers(&[("web01", SourceType::Host, "mem", None)]);
        let host = HostName::new("web01");
        let topology = HostTopology {
            host_name: &host,
            is_cluster: false,
            cluster_nodes: &[],
        };
        let service = ConfiguredService::new("cpu_loads", None, "CPU load");
        let result =
            get_monitoring_data_kwargs(&topology, &providers, &service, &sections(&["cpu"]), None, &same_host);
        assert_eq!(result, Err(ServiceCheckResult::received_no_data()));

        // management plugins read the management provider
        let mgmt = ConfiguredService::new("mgmt_mem", None, "Management Memory");
        let result =
            get_monitoring_data_kwargs(&topology, &providers, &mgmt, &sections(&["mem"]), None, &same_host);
        assert!(result.is_err());
    }

    #[test]
    fn test_cluster_kwargs_tolerate_missing_nodes() {
        let providers = providers(&[("node1", SourceType::Host, "cpu", Some(CacheInfo::new(10, 5)))]);
        let cluster = HostName::new("cluster");
        let nodes = [HostName::new("node1"), HostName::new("node2")];
        let topology = HostTopology {
            host_name: &cluster,
            is_cluster: true,
            cluster_nodes: &nodes,
        };
        let owned_by_cluster = |_: &HostName, _: &str| HostName::new("cluster");
        let service = ConfiguredService::new("cpu_loads", None, "CPU load");

        let data = get_monitoring_data_kwargs(
            &topology,
            &providers,
            &service,
            &sections(&["cpu"]),
            None,
            &owned_by_cluster,
        )
        .unwrap();
        match data.sections {
            SectionKwargs::Cluster(per_node) => {
                assert_eq!(per_node.keys().cloned().collect::<Vec<_>>(), vec![HostName::new("node1")]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(data.cache_info, Some(CacheInfo::new(10, 5)));
    }

    #[test]
    fn test_cluster_without_data() {
        let providers = providers(&[]);
        let cluster = HostName::new("cluster");
        let nodes = [HostName::new("node1"), HostName::new("node2")];
        let topology = HostTopology {
            host_name: &cluster,
            is_cluster: true,
            cluster_nodes: &nodes,
        };
        let service = ConfiguredService::new("cpu_loads", None, "CPU load");
        let result =
            get_monitoring_data_kwargs(&topology, &providers, &service, &sections(&["cpu"]), None, &same_host);
        assert_eq!(result, Err(ServiceCheckResult::cluster_received_no_data(&nodes)));
    }

    #[test]
    fn test_owning_nodes_filter_and_fallback() {
        let cluster = HostName::new("cluster");
        let nodes = [HostName::new("A"), HostName::new("B")];
        let topology = HostTopology {
            host_name: &cluster,
            is_cluster: true,
            cluster_nodes: &nodes,
        };
        let only_b = |node: &HostName, _: &str| {
            if node.as_str() == "B" {
                HostName::new("cluster")
            } else {
                node.clone()
            }
        };
        assert_eq!(owning_nodes(&topology, "svc", &only_b), vec![HostName::new("B")]);
        // nobody owns the service: every node is used
        assert_eq!(owning_nodes(&topology, "svc", &same_host), nodes.to_vec());
    }
}
