//! Cluster modes: how a clustered service turns per-node data into one result.
//!
//! The mode is resolved before invocation and yields a `ClusterCheckFunction`
//! wrapping the plugin's node-level function (or its native cluster function).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use crate::checkresults::State;
use crate::context::CheckContext;
use crate::errors::CheckError;
use crate::models::HostName;
use crate::plugins::{
    CheckArgs, CheckFunction, CheckFunctionResult, CheckOutput, CheckPlugin, ClusterCheckArgs,
    ClusterCheckFunction, SectionData, SubResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    #[default]
    Native,
    Merge,
    Worst,
    Best,
    Failover,
}

fn cluster_function<F>(function: F) -> ClusterCheckFunction
where
    F: Fn(&ClusterCheckArgs, &mut CheckContext<'_>) -> CheckFunctionResult + Send + Sync + 'static,
{
    Arc::new(function)
}

/// Fonction effectivement appelée pour un service de cluster
pub fn get_cluster_check_function(mode: ClusterMode, plugin: &CheckPlugin) -> ClusterCheckFunction {
    match mode {
        ClusterMode::Native => match &plugin.cluster_check_function {
            Some(function) => Arc::clone(function),
            None => {
                let name = plugin.name.clone();
                cluster_function(move |_args, _ctx| {
                    Err(CheckError::failed(format!(
                        "Plugin {name} does not support native cluster mode, \
                         use one of 'merge', 'worst', 'best' or 'failover'"
                    )))
                })
            }
        },
        ClusterMode::Merge => {
            let node_function = Arc::clone(&plugin.check_function);
            cluster_function(move |args, ctx| {
                let merged = CheckArgs {
                    item: args.item.clone(),
                    params: args.params.clone(),
                    sections: merge_node_sections(args.nodes.values()),
                };
                node_function(&merged, ctx)
            })
        }
        ClusterMode::Worst | ClusterMode::Best | ClusterMode::Failover => {
            let node_function = Arc::clone(&plugin.check_function);
            cluster_function(move |args, ctx| {
                let nodes = run_on_nodes(&node_function, args, ctx)?;
                Ok(select_node(mode, nodes))
            })
        }
    }
}

/// Fusion des sections de tous les noeuds : objets fusionnés clé par clé,
/// tableaux concaténés, le dernier noeud l'emporte pour les scalaires
pub fn merge_node_sections<'a, I>(nodes: I) -> SectionData
where
    I: IntoIterator<Item = &'a SectionData>,
{
    let mut merged: BTreeMap<_, Option<Value>> = BTreeMap::new();
    for sections in nodes {
        for (name, data) in sections {
            let slot = merged.entry(name.clone()).or_insert(None);
            if let Some(data) = data {
                *slot = Some(match slot.take() {
                    None => (**data).clone(),
                    Some(existing) => merge_values(existing, data),
                });
            }
        }
    }
    merged
        .into_iter()
        .map(|(name, value)| (name, value.map(Arc::new)))
        .collect()
}

fn merge_values(existing: Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key.clone(), value.clone());
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(more)) => {
            base.extend(more.iter().cloned());
            Value::Array(base)
        }
        (_, incoming) => incoming.clone(),
    }
}

struct NodeOutcome {
    node: HostName,
    outputs: Vec<CheckOutput>,
    state: State,
}

fn has_data(sections: &SectionData) -> bool {
    sections.values().any(Option::is_some)
}

/// Appelle la fonction de noeud sur chaque noeud ayant des données, chacun
/// dans son propre namespace. Les noeuds sans sous-résultat sont écartés.
fn run_on_nodes(
    node_function: &CheckFunction,
    args: &ClusterCheckArgs,
    ctx: &CheckContext<'_>,
) -> Result<Vec<NodeOutcome>, CheckError> {
    let mut outcomes = Vec::new();
    let mut ignored: Option<Option<String>> = None;

    for (node, sections) in &args.nodes {
        if !has_data(sections) {
            continue;
        }
        let node_args = CheckArgs {
            item: args.item.clone(),
            params: args.params.clone(),
            sections: sections.clone(),
        };
        let mut node_ctx = ctx.for_node(node);
        match node_function(&node_args, &mut node_ctx) {
            Ok(outputs) => {
                let state = State::worst_of(outputs.iter().filter_map(|o| match o {
                    CheckOutput::Result(result) => Some(result.state),
                    CheckOutput::Metric(_) => None,
                }));
                match state {
                    Some(state) => outcomes.push(NodeOutcome {
                        node: node.clone(),
                        outputs,
                        state,
                    }),
                    None => trace!("[cluster] node {} yielded no results", node),
                }
            }
            Err(CheckError::IgnoreResults(message)) => {
                ignored.get_or_insert(message);
            }
            Err(other) => return Err(other),
        }
    }

    if outcomes.is_empty() {
        if let Some(message) = ignored {
            return Err(CheckError::IgnoreResults(message));
        }
    }
    Ok(outcomes)
}

fn first_summary(outputs: &[CheckOutput]) -> String {
    outputs
        .iter()
        .find_map(|o| match o {
            CheckOutput::Result(r) if !r.summary.is_empty() => Some(r.summary.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "no summary".to_string())
}

fn select_node(mode: ClusterMode, nodes: Vec<NodeOutcome>) -> Vec<CheckOutput> {
    let selected = match mode {
        ClusterMode::Best => nodes
            .iter()
            .enumerate()
            .min_by_key(|(index, n)| (n.state.rank(), *index))
            .map(|(index, _)| index),
        _ => nodes
            .iter()
            .enumerate()
            .max_by_key(|(index, n)| (n.state.rank(), std::cmp::Reverse(*index)))
            .map(|(index, _)| index),
    };
    let Some(selected) = selected else {
        return Vec::new();
    };

    let mut outputs = Vec::new();
    let mut prefixed = false;
    for output in &nodes[selected].outputs {
        match output {
            CheckOutput::Result(result) if !prefixed && !result.summary.is_empty() => {
                prefixed = true;
                outputs.push(CheckOutput::Result(SubResult {
                    summary: format!("[{}]: {}", nodes[selected].node, result.summary),
                    ..result.clone()
                }));
            }
            other => outputs.push(other.clone()),
        }
    }

    for (index, other) in nodes.iter().enumerate() {
        if index == selected {
            continue;
        }
        if mode == ClusterMode::Failover {
            outputs.push(CheckOutput::result(
                State::Warn,
                format!("[{}] yields results as well - failover service", other.node),
            ));
        } else {
            outputs.push(CheckOutput::notice(
                State::Ok,
                format!("[{}]: {}", other.node, first_summary(&other.outputs)),
            ));
        }
    }
    outputs
}
