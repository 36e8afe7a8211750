//! End-to-end runs of the check engine through the devkit harness.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use symbion_checkengine::inventory::{Attributes, InventoryArgs, InventoryItem, InventoryPlugin};
use symbion_checkengine::parameters::TimespecificParameterSet;
use symbion_checkengine::{
    CheckError, CheckOutput, CheckPlugin, ClusterMode, EngineError, ExitSpec, HostName, RunPluginNames,
    SectionPlugin, State, ValueStoreManager,
};
use symbion_devkit::fixtures::{agent_source, management_source, single_agent};
use symbion_devkit::{AgentOutputBuilder, ServiceBuilder, StubCheckPlugin, TestHarness};

fn cpu_output() -> AgentOutputBuilder {
    AgentOutputBuilder::new().section("cpu", &["0.42 0.38 0.31"])
}

/// State taken from the first cell of the node's "status" section
fn status_plugin() -> CheckPlugin {
    CheckPlugin::new("status", &["status"], |args, _ctx| {
        let state = args
            .section("status")
            .and_then(|v| v[0][0].as_str())
            .and_then(|s| s.parse::<u8>().ok())
            .and_then(|s| State::try_from(s).ok())
            .ok_or_else(|| CheckError::failed("bad status"))?;
        Ok(vec![CheckOutput::result(state, format!("status {}", state.as_u8()))])
    })
}

#[test]
fn test_missing_section_skips_plugin_call() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]);
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    let fetched = single_agent("web01", AgentOutputBuilder::new().section("mem", &["MemTotal: 100 kB"]));
    let result = harness.run_host("web01", &services, fetched).unwrap();

    assert_eq!(stub.call_count(), 0);
    let submittee = harness.submittee("CPU load");
    assert!(submittee.pending);
    assert_eq!(submittee.result.state, State::Unknown);
    assert_eq!(submittee.result.output, "Check plugin received no monitoring data");
    assert_eq!(submittee.cache_info, None);
    assert_eq!(result.state, State::Warn);
    assert_eq!(result.summary, "[agent] Success, Missing monitoring data for all plugins(!)");
}

#[test]
fn test_cluster_without_owner_uses_all_nodes() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]).with_native_cluster();
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];
    let fetched = vec![
        cpu_output().fetched_from(agent_source("node1")),
        cpu_output().fetched_from(agent_source("node2")),
    ];

    harness.run_cluster("cluster1", &["node1", "node2"], &services, fetched).unwrap();

    // node -> node mapping never names the cluster, so every node is used
    assert_eq!(stub.calls()[0].nodes, vec!["node1", "node2"]);
}

#[test]
fn test_cluster_with_owner_uses_owning_nodes_only() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]).with_native_cluster();
    let harness = TestHarness::new()
        .with_check_plugin(stub.plugin())
        .with_effective_host("node1", "CPU load", "cluster1");
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];
    let fetched = vec![
        cpu_output().fetched_from(agent_source("node1")),
        cpu_output().fetched_from(agent_source("node2")),
    ];

    harness.run_cluster("cluster1", &["node1", "node2"], &services, fetched).unwrap();
    assert_eq!(stub.calls()[0].nodes, vec!["node1"]);
}

#[test]
fn test_cluster_without_data() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]).with_native_cluster();
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    harness
        .run_cluster("cluster1", &["node1", "node2"], &services, single_agent("node1", AgentOutputBuilder::new()))
        .unwrap();

    assert_eq!(stub.call_count(), 0);
    assert_eq!(
        harness.submittee("CPU load").result.output,
        "Clustered service received no monitoring data (configured nodes: node1, node2)"
    );
}

#[test]
fn test_unregistered_plugin_is_always_reported() {
    let harness = TestHarness::new().with_inactive_period("workhours");
    let services = vec![ServiceBuilder::new("vanished", "Old service").check_period("workhours").build()];

    let result = harness
        .run_host("web01", &services, single_agent("web01", AgentOutputBuilder::new()))
        .unwrap();

    let submitted = harness.submitted();
    assert_eq!(submitted.len(), 1);
    assert!(!submitted[0].pending);
    assert_eq!(submitted[0].result.state, State::Unknown);
    assert_eq!(submitted[0].result.output, "Check plugin not implemented");
    // counted as data received: no missing-data message
    assert_eq!(result.summary, "[agent] Empty output(!!)");
}

#[test]
fn test_inactive_period_emits_nothing() {
    let cpu = StubCheckPlugin::new("cpu_loads", &["cpu"]);
    let mem = StubCheckPlugin::new("mem", &["cpu"]);
    let harness = TestHarness::new()
        .with_check_plugin(cpu.plugin())
        .with_check_plugin(mem.plugin())
        .with_inactive_period("night");
    let services = vec![
        ServiceBuilder::new("cpu_loads", "CPU load").check_period("night").build(),
        ServiceBuilder::new("mem", "Memory").check_period("24X7").build(),
    ];

    harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();

    let descriptions: Vec<String> = harness.submitted().into_iter().map(|s| s.description).collect();
    assert_eq!(descriptions, vec!["Memory"]);
    assert_eq!(cpu.call_count(), 0);
}

#[test]
fn test_missing_data_partition() {
    let harness = TestHarness::new()
        .with_check_plugin(StubCheckPlugin::new("cpu_loads", &["cpu"]).plugin())
        .with_check_plugin(StubCheckPlugin::new("df", &["df"]).plugin())
        .with_check_plugin(StubCheckPlugin::new("mem", &["mem"]).plugin())
        .with_exit_spec(ExitSpec {
            specific_missing_sections: vec![("df".to_string(), State::Warn)],
            ..ExitSpec::default()
        });
    let services = vec![
        ServiceBuilder::new("cpu_loads", "CPU load").build(),
        ServiceBuilder::new("df", "Filesystem /").item("/").build(),
        ServiceBuilder::new("mem", "Memory").build(),
    ];

    let result = harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();

    assert_eq!(result.state, State::Warn);
    assert_eq!(
        result.summary,
        "[agent] Success, Missing monitoring data for plugins: mem(!), df(!)"
    );
}

#[test]
fn test_markers_on_combined_output() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]).returning(vec![
        CheckOutput::result(State::Ok, "fine"),
        CheckOutput::result(State::Warn, "slow"),
    ]);
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();

    let result = harness.submittee("CPU load").result;
    assert_eq!(result.state, State::Warn);
    assert!(result.output.starts_with("fine, slow(!)\nfine\nslow(!)"));
}

#[test]
fn test_crash_is_contained_and_run_continues() {
    let crashing = StubCheckPlugin::new("cpu_loads", &["cpu"]).panicking("boom");
    let failing = StubCheckPlugin::new("mem", &["cpu"]).failing(CheckError::failed("bad value"));
    let fine = StubCheckPlugin::new("uptime", &["cpu"]);
    let harness = TestHarness::new()
        .with_check_plugin(crashing.plugin())
        .with_check_plugin(failing.plugin())
        .with_check_plugin(fine.plugin());
    let services = vec![
        ServiceBuilder::new("cpu_loads", "CPU load").build(),
        ServiceBuilder::new("mem", "Memory").build(),
        ServiceBuilder::new("uptime", "Uptime").build(),
    ];

    let result = harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();

    let crashed = harness.submittee("CPU load");
    assert_eq!(crashed.result.state, State::Unknown);
    assert!(crashed.result.output.contains("boom"));
    assert!(crashed.result.output.contains("Crash-ID:"));
    assert!(!crashed.pending);
    assert!(harness.submittee("Memory").result.output.contains("bad value"));
    assert_eq!(harness.submittee("Uptime").result.state, State::Ok);
    assert_eq!(fine.call_count(), 1);

    let reports = harness.crash_reporter.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].plugin_name.as_str(), "cpu_loads");
    assert_eq!(reports[0].message, "boom");
    assert_eq!(result.summary, "[agent] Success");
}

#[test]
fn test_crash_report_keeps_agent_payload() {
    let crashing = StubCheckPlugin::new("cpu_loads", &["cpu"]).panicking("boom");
    let harness = TestHarness::new().with_check_plugin(crashing.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();

    let reports = harness.crash_reporter.reports();
    assert_eq!(reports.len(), 1);
    let payload = reports[0].rtc_package.as_deref().unwrap();
    assert!(payload.starts_with("<<<cpu>>>"));
}

#[test]
#[should_panic(expected = "boom")]
fn test_debug_mode_lets_panics_through() {
    let crashing = StubCheckPlugin::new("cpu_loads", &["cpu"]).panicking("boom");
    let harness = TestHarness::new().with_check_plugin(crashing.plugin()).debug_mode();
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];
    let _ = harness.run_host("web01", &services, single_agent("web01", cpu_output()));
}

#[test]
fn test_debug_mode_raises_failures() {
    let failing = StubCheckPlugin::new("cpu_loads", &["cpu"]).failing(CheckError::failed("bad value"));
    let harness = TestHarness::new().with_check_plugin(failing.plugin()).debug_mode();
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    let error = harness
        .run_host("web01", &services, single_agent("web01", cpu_output()))
        .unwrap_err();
    assert!(matches!(error, EngineError::PluginCrash { ref plugin, .. } if plugin == "cpu_loads"));
    assert!(harness.crash_reporter.reports().is_empty());
}

#[test]
fn test_cancellation_stops_the_run() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]);
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    harness.cancellation.cancel();
    let result = harness.run_host("web01", &services, single_agent("web01", cpu_output()));

    assert!(matches!(result, Err(EngineError::Timeout)));
    assert_eq!(stub.call_count(), 0);
    assert!(harness.submitted().is_empty());
}

#[test]
fn test_plugin_timeout_propagates() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]).failing(CheckError::Timeout);
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    let result = harness.run_host("web01", &services, single_agent("web01", cpu_output()));
    assert!(matches!(result, Err(EngineError::Timeout)));
}

#[test]
fn test_ignored_results_are_pending_but_received() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]).failing(CheckError::IgnoreResults(None));
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    let result = harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();

    let submittee = harness.submittee("CPU load");
    assert!(submittee.pending);
    assert_eq!(submittee.result.state, State::Ok);
    assert_eq!(submittee.result.output, "No service summary available");
    assert_eq!(result.summary, "[agent] Success");
}

#[test]
fn test_cluster_modes_select_nodes() {
    let fetched = || {
        vec![
            AgentOutputBuilder::new().section("status", &["0"]).fetched_from(agent_source("node1")),
            AgentOutputBuilder::new().section("status", &["2"]).fetched_from(agent_source("node2")),
        ]
    };
    let services = vec![ServiceBuilder::new("status", "Status").build()];
    let run = |mode: ClusterMode| {
        let harness = TestHarness::new()
            .with_check_plugin(status_plugin())
            .with_cluster_mode("Status", mode);
        harness.run_cluster("cluster1", &["node1", "node2"], &services, fetched()).unwrap();
        harness.submittee("Status").result
    };

    let worst = run(ClusterMode::Worst);
    assert_eq!(worst.state, State::Crit);
    assert!(worst.output.starts_with("[node2]: status 2(!!)"));
    assert!(worst.output.ends_with("[node1]: status 0"));

    let best = run(ClusterMode::Best);
    assert_eq!(best.state, State::Ok);
    assert!(best.output.starts_with("[node1]: status 0"));

    let failover = run(ClusterMode::Failover);
    assert_eq!(failover.state, State::Crit);
    assert!(failover.output.contains("[node1] yields results as well - failover service(!)"));

    let native = run(ClusterMode::Native);
    assert_eq!(native.state, State::Unknown);
    assert!(native.output.contains("does not support native cluster mode"));
}

#[test]
fn test_merge_mode_calls_once_with_merged_sections() {
    let stub = StubCheckPlugin::new("status", &["status"]);
    let harness = TestHarness::new()
        .with_check_plugin(stub.plugin())
        .with_cluster_mode("Status", ClusterMode::Merge);
    let services = vec![ServiceBuilder::new("status", "Status").build()];
    let fetched = vec![
        AgentOutputBuilder::new().section("status", &["0"]).fetched_from(agent_source("node1")),
        AgentOutputBuilder::new().section("status", &["2"]).fetched_from(agent_source("node2")),
    ];

    harness.run_cluster("cluster1", &["node1", "node2"], &services, fetched).unwrap();

    assert_eq!(stub.call_count(), 1);
    assert_eq!(stub.calls()[0].sections["status"], Some(json!([["0"], ["2"]])));
}

#[test]
fn test_parameters_are_merged_over_defaults() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"])
        .with_default_parameters(json!({"levels": [5.0, 10.0], "average": 1}));
    let harness = TestHarness::new()
        .with_check_plugin(stub.plugin())
        .with_inactive_period("night");
    let services = vec![
        ServiceBuilder::new("cpu_loads", "CPU load").params(json!({"levels": [2.0, 4.0]})).build(),
        ServiceBuilder::new("cpu_loads", "CPU load night")
            .item("night")
            .timespecific(vec![TimespecificParameterSet {
                default: json!({"average": 5}),
                timeperiod_values: vec![("night".into(), json!({"average": 15}))],
            }])
            .build(),
    ];

    harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();

    let calls = stub.calls();
    assert_eq!(calls[0].params, Some(json!({"levels": [2.0, 4.0], "average": 1})));
    assert_eq!(calls[1].item.as_deref(), Some("night"));
    assert_eq!(calls[1].params, Some(json!({"levels": [5.0, 10.0], "average": 5})));
}

fn counter_plugin() -> CheckPlugin {
    CheckPlugin::new("if_counter", &["net"], |args, ctx| {
        let row = args.section("net").and_then(Value::as_array).and_then(|rows| rows.first()).cloned();
        let (time, value) = row
            .as_ref()
            .and_then(|r| Some((r[0].as_str()?.parse::<f64>().ok()?, r[1].as_str()?.parse::<f64>().ok()?)))
            .ok_or_else(|| CheckError::failed("bad counter"))?;
        let rate = ctx.value_store().rate("in_octets", time, value)?;
        Ok(vec![
            CheckOutput::result(State::Ok, format!("In: {rate:.2}/s")),
            CheckOutput::metric("in", rate),
        ])
    })
}

#[test]
fn test_rates_survive_between_runs() {
    let harness = TestHarness::new().with_check_plugin(counter_plugin());
    let services = vec![ServiceBuilder::new("if_counter", "Interface eth0").item("eth0").build()];

    let first = AgentOutputBuilder::new().section("net", &["100 5000"]);
    harness.run_host("web01", &services, single_agent("web01", first)).unwrap();
    let initial = harness.submittee("Interface eth0");
    assert!(initial.pending);
    assert_eq!(initial.result.output, "Initialized: 'in_octets'");

    harness.submitter.clear();
    let second = AgentOutputBuilder::new().section("net", &["110 5100"]);
    harness.run_host("web01", &services, single_agent("web01", second)).unwrap();
    let measured = harness.submittee("Interface eth0");
    assert!(!measured.pending);
    assert!(measured.result.output.starts_with("In: 10.00/s"));
}

#[test]
fn test_rates_survive_a_value_store_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counters.json");
    let services = vec![ServiceBuilder::new("if_counter", "Interface eth0").item("eth0").build()];

    let mut first = TestHarness::new().with_check_plugin(counter_plugin());
    first.value_store = ValueStoreManager::load(&path).unwrap();
    let output = AgentOutputBuilder::new().section("net", &["100 5000"]);
    first.run_host("web01", &services, single_agent("web01", output)).unwrap();
    first.value_store.save().unwrap();

    let mut second = TestHarness::new().with_check_plugin(counter_plugin());
    second.value_store = ValueStoreManager::load(&path).unwrap();
    let output = AgentOutputBuilder::new().section("net", &["110 5100"]);
    second.run_host("web01", &services, single_agent("web01", output)).unwrap();
    assert!(second.submittee("Interface eth0").result.output.starts_with("In: 10.00/s"));
}

#[test]
fn test_superseding_section_wins() {
    let stub = StubCheckPlugin::new("interfaces", &["interfaces"]);
    let harness = TestHarness::new()
        .with_section_plugin(SectionPlugin::trivial("if").with_parsed_section_name("interfaces"))
        .with_section_plugin(
            SectionPlugin::trivial("lnx_if")
                .with_parsed_section_name("interfaces")
                .superseding(["if"]),
        )
        .with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("interfaces", "Interfaces").build()];
    let output = AgentOutputBuilder::new()
        .section("if", &["snmp 1"])
        .section("lnx_if", &["eth0 1000"]);

    harness.run_host("web01", &services, single_agent("web01", output)).unwrap();
    assert_eq!(stub.calls()[0].sections["interfaces"], Some(json!([["eth0", "1000"]])));
}

#[test]
fn test_parsing_errors_reach_host_result() {
    let stub = StubCheckPlugin::new("mem", &["mem"]);
    let harness = TestHarness::new()
        .with_section_plugin(SectionPlugin::new("mem", |_| Err("missing MemTotal".to_string())))
        .with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("mem", "Memory").build()];

    let output = AgentOutputBuilder::new().section("mem", &["garbage"]);
    let result = harness.run_host("web01", &services, single_agent("web01", output)).unwrap();

    assert_eq!(stub.call_count(), 0);
    assert_eq!(result.state, State::Warn);
    assert_eq!(
        result.summary,
        "[agent] Success, Parsing of section mem failed(!), Missing monitoring data for all plugins(!)"
    );
    assert_eq!(result.details, vec!["Parsing of section mem failed - missing MemTotal"]);
}

#[test]
fn test_management_plugins_read_management_data() {
    let stub = StubCheckPlugin::new("ipmi", &["ipmi"]);
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("mgmt_ipmi", "Management IPMI").build()];
    let fetched = vec![
        AgentOutputBuilder::new().section("ipmi", &["host-side 1"]).fetched_from(agent_source("web01")),
        AgentOutputBuilder::new().section("ipmi", &["bmc 1"]).fetched_from(management_source("web01")),
    ];

    let result = harness.run_host("web01", &services, fetched).unwrap();

    assert_eq!(stub.calls()[0].sections["ipmi"], Some(json!([["bmc", "1"]])));
    assert_eq!(result.summary, "[agent] Success, [mgmt_ipmi] Success");
}

#[test]
fn test_failed_source_is_summarized() {
    let stub = StubCheckPlugin::new("cpu_loads", &["cpu"]);
    let harness = TestHarness::new().with_check_plugin(stub.plugin());
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];
    let fetched = vec![
        cpu_output().fetched_from(agent_source("web01")),
        (
            management_source("web01"),
            Err(symbion_checkengine::FetchError::Connection("refused".into())),
        ),
    ];

    let result = harness.run_host("web01", &services, fetched).unwrap();
    assert_eq!(result.state, State::Crit);
    assert_eq!(result.summary, "[agent] Success, [mgmt_ipmi] Communication failed: refused(!!)");
    assert_eq!(stub.call_count(), 1);
}

#[test]
fn test_status_inventory_only_on_full_runs() {
    let inventory = InventoryPlugin::new("cpu", &["cpu"], |args: &InventoryArgs| {
        let load = args.section("cpu").map(|v| v[0][0].clone()).unwrap_or(Value::Null);
        Ok(vec![InventoryItem::Attributes(Attributes {
            path: vec!["hardware".into(), "cpu".into()],
            status_attributes: [("load".to_string(), load)].into_iter().collect(),
            ..Default::default()
        })])
    });
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];
    let host = HostName::from("web01");

    let harness = TestHarness::new()
        .with_check_plugin(StubCheckPlugin::new("cpu_loads", &["cpu"]).plugin())
        .with_inventory_plugin(inventory.clone())
        .with_status_data_inventory();
    harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();
    let tree = harness.tree_store.get(&host).unwrap();
    assert_eq!(tree.node(&["hardware", "cpu"]).unwrap().attributes["load"], json!("0.42"));

    let partial = TestHarness::new()
        .with_check_plugin(StubCheckPlugin::new("cpu_loads", &["cpu"]).plugin())
        .with_inventory_plugin(inventory)
        .with_status_data_inventory()
        .with_run_plugin_names(RunPluginNames::only(["cpu_loads"]));
    partial.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();
    assert!(partial.tree_store.get(&host).is_none());
}

#[test]
fn test_panicking_inventory_keeps_host_result() {
    let inventory = InventoryPlugin::new("cpu", &["cpu"], |_: &InventoryArgs| -> Result<Vec<InventoryItem>, String> {
        panic!("inventory bug")
    });
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];
    let harness = TestHarness::new()
        .with_check_plugin(StubCheckPlugin::new("cpu_loads", &["cpu"]).plugin())
        .with_inventory_plugin(inventory)
        .with_status_data_inventory();

    let result = harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();
    assert_eq!(result.state, State::Ok);
    assert_eq!(result.summary, "[agent] Success");
    assert_eq!(harness.submittee("CPU load").result.state, State::Ok);
    assert!(harness.tree_store.get(&HostName::from("web01")).is_none());
}

#[test]
fn test_one_invocation_per_service_at_a_time() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
    let slow = CheckPlugin::new("cpu_loads", &["cpu"], move |_, _| {
        let now = a.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        a.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![CheckOutput::result(State::Ok, "done")])
    });
    let harness = TestHarness::new().with_check_plugin(slow);
    let services = vec![ServiceBuilder::new("cpu_loads", "CPU load").build()];

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                harness.run_host("web01", &services, single_agent("web01", cpu_output())).unwrap();
            });
        }
    });

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(harness.submitted().len(), 4);
    assert_eq!(harness.locks.in_flight(), 0);
}
