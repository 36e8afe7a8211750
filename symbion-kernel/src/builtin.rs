/**
 * BUILTIN - Plugins livrés avec le kernel
 *
 * RÔLE : sections et checks de base d'un agent Linux (uptime, mem, cpu)
 * plus un plugin d'inventaire mémoire, enregistrés au démarrage.
 *
 * FORMAT DES SECTIONS :
 * - <<<uptime>>> "12345.67 45678.90"
 * - <<<mem>>>    "MemTotal: 16384000 kB" (une ligne par compteur)
 * - <<<cpu>>>    "0.52 0.58 0.59 1/123 4567" puis nombre de coeurs
 */

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use symbion_checkengine::inventory::{Attributes, InventoryItem, InventoryPlugin, InventoryPluginRegistry};
use symbion_checkengine::parser::StringTable;
use symbion_checkengine::plugins::CheckFunctionResult;
use symbion_checkengine::{CheckArgs, CheckError, CheckOutput, CheckPlugin, CheckPluginRegistry, SectionPlugin, State};
use symbion_checkengine::checkresults::MetricTuple;

pub fn section_plugins() -> Vec<SectionPlugin> {
    vec![
        SectionPlugin::new("uptime", parse_uptime),
        SectionPlugin::new("mem", parse_mem),
        SectionPlugin::new("cpu", parse_cpu),
    ]
}

pub fn check_plugins() -> CheckPluginRegistry {
    CheckPluginRegistry::new([
        CheckPlugin::new("uptime", &["uptime"], |args, _| check_uptime(args)),
        CheckPlugin::new("mem", &["mem"], |args, _| check_mem(args))
            .with_default_parameters(json!({ "levels": [80.0, 90.0] }))
            .with_ruleset("memory"),
        CheckPlugin::new("cpu_loads", &["cpu"], |args, _| check_cpu_loads(args))
            .with_default_parameters(json!({ "levels": [5.0, 10.0] }))
            .with_ruleset("cpu_load"),
    ])
}

pub fn inventory_plugins() -> InventoryPluginRegistry {
    let plugin = InventoryPlugin::new("inventory_mem", &["mem"], |args| {
        let Some(mem) = args.section("mem") else {
            return Ok(Vec::new());
        };
        let mut attributes = Attributes {
            path: vec!["hardware".into(), "memory".into()],
            ..Default::default()
        };
        if let Some(total) = mem.get("MemTotal") {
            attributes.inventory_attributes.insert("total_ram_usable".into(), total.clone());
        }
        if let Some(available) = mem.get("MemAvailable") {
            attributes.status_attributes.insert("available_ram".into(), available.clone());
        }
        Ok(vec![InventoryItem::Attributes(attributes)])
    });
    [(plugin.name.clone(), plugin)].into_iter().collect()
}

fn first_f64(table: &StringTable) -> Vec<f64> {
    table
        .first()
        .map(|row| row.iter().filter_map(|word| word.parse().ok()).collect())
        .unwrap_or_default()
}

fn parse_uptime(table: &StringTable) -> Result<Value, String> {
    match first_f64(table).first() {
        Some(seconds) => Ok(json!({ "uptime_sec": seconds })),
        None => Err("no uptime value".into()),
    }
}

/// Valeurs en octets, clés sans le ':' final
fn parse_mem(table: &StringTable) -> Result<Value, String> {
    let mut counters = Map::new();
    for row in table {
        let [key, value, rest @ ..] = row.as_slice() else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        let factor = match rest.first().map(String::as_str) {
            Some("kB") => 1024,
            _ => 1,
        };
        counters.insert(key.trim_end_matches(':').to_string(), json!(value * factor));
    }
    if counters.is_empty() {
        return Err("no memory counters".into());
    }
    Ok(Value::Object(counters))
}

fn parse_cpu(table: &StringTable) -> Result<Value, String> {
    let loads = first_f64(table);
    if loads.len() < 3 {
        return Err(format!("expected 3 load averages, got {}", loads.len()));
    }
    let num_cpus = table
        .get(1)
        .and_then(|row| row.first())
        .and_then(|cores| cores.parse::<u64>().ok());
    Ok(json!({ "load": &loads[..3], "num_cpus": num_cpus }))
}

fn levels_state(value: f64, levels: Option<(f64, f64)>) -> State {
    match levels {
        Some((_, crit)) if value >= crit => State::Crit,
        Some((warn, _)) if value >= warn => State::Warn,
        _ => State::Ok,
    }
}

fn levels_text(state: State, levels: Option<(f64, f64)>) -> String {
    match (state, levels) {
        (State::Ok, _) | (_, None) => String::new(),
        (_, Some((warn, crit))) => format!(" (warn/crit at {warn:.2}/{crit:.2})"),
    }
}

fn render_timespan(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, minutes, secs) = (rem / 3600, rem % 3600 / 60, rem % 60);
    match days {
        0 => format!("{hours:02}:{minutes:02}:{secs:02}"),
        1 => format!("1 day {hours:02}:{minutes:02}:{secs:02}"),
        _ => format!("{days} days {hours:02}:{minutes:02}:{secs:02}"),
    }
}

fn render_bytes(bytes: f64) -> String {
    format!("{:.2} GiB", bytes / 1024f64.powi(3))
}

fn check_uptime(args: &CheckArgs) -> CheckFunctionResult {
    let seconds = args
        .section("uptime")
        .and_then(|s| s.get("uptime_sec"))
        .and_then(Value::as_f64)
        .ok_or_else(|| CheckError::failed("uptime section without value"))?;
    Ok(vec![
        CheckOutput::result(State::Ok, format!("Up since {}", render_timespan(seconds))),
        CheckOutput::metric("uptime", seconds),
    ])
}

fn check_mem(args: &CheckArgs) -> CheckFunctionResult {
    let counters: BTreeMap<String, f64> = args
        .section("mem")
        .and_then(Value::as_object)
        .map(|m| m.iter().filter_map(|(k, v)| Some((k.clone(), v.as_f64()?))).collect())
        .unwrap_or_default();
    let (Some(&total), Some(&available)) = (counters.get("MemTotal"), counters.get("MemAvailable")) else {
        return Err(CheckError::failed("MemTotal or MemAvailable missing"));
    };
    if total <= 0.0 {
        return Err(CheckError::failed("MemTotal is zero"));
    }

    let used = total - available;
    let percent = used / total * 100.0;
    let levels = args.params.as_ref().and_then(|p| p.levels("levels"));
    let state = levels_state(percent, levels);

    let mut metric = MetricTuple::new("mem_used_percent", percent).with_boundaries(Some(0.0), Some(100.0));
    if let Some((warn, crit)) = levels {
        metric = metric.with_levels(warn, crit);
    }
    Ok(vec![
        CheckOutput::result(
            state,
            format!(
                "RAM: {percent:.2}% used - {} of {}{}",
                render_bytes(used),
                render_bytes(total),
                levels_text(state, levels)
            ),
        ),
        CheckOutput::Metric(metric),
        CheckOutput::metric("mem_used", used),
    ])
}

fn check_cpu_loads(args: &CheckArgs) -> CheckFunctionResult {
    let Some(section) = args.section("cpu") else {
        return Err(CheckError::failed("cpu section missing"));
    };
    let loads: Vec<f64> = section
        .get("load")
        .and_then(Value::as_array)
        .map(|l| l.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    let [load1, load5, load15] = loads.as_slice() else {
        return Err(CheckError::failed("expected 3 load averages"));
    };

    let levels = args.params.as_ref().and_then(|p| p.levels("levels"));
    let state = levels_state(*load15, levels);
    let mut outputs = vec![CheckOutput::result(
        state,
        format!("15 min load: {load15:.2}{}", levels_text(state, levels)),
    )];
    if let Some(cores) = section.get("num_cpus").and_then(Value::as_u64).filter(|c| *c > 0) {
        outputs.push(CheckOutput::notice(
            State::Ok,
            format!("15 min load per core: {:.2} ({cores} cores)", load15 / cores as f64),
        ));
    }
    let mut load15_metric = MetricTuple::new("load15", *load15);
    if let Some((warn, crit)) = levels {
        load15_metric = load15_metric.with_levels(warn, crit);
    }
    outputs.extend([
        CheckOutput::metric("load1", *load1),
        CheckOutput::metric("load5", *load5),
        CheckOutput::Metric(load15_metric),
    ]);
    Ok(outputs)
}
