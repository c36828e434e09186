use graphtab::{
    ErrorKind, Expectation, Scenario, ScenarioOutcome, conformance::rows, run_all, run_scenario,
};

fn acceptance_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("create empty node", "MATCH (n) RETURN n", rows([["()"]]))
            .with_setup("CREATE ()"),
        Scenario::new(
            "create node with property",
            "MATCH (n) RETURN n.name",
            rows([["'A'"]]),
        )
        .with_setup("CREATE ({name: 'A'})"),
        Scenario::new("count nodes", "MATCH (n) RETURN count(n)", rows([["2"]]))
            .with_setup("CREATE (), ()"),
        Scenario::new(
            "match by label",
            "MATCH (n:Label) RETURN n",
            rows([["(:Label)"]]),
        )
        .with_setup("CREATE (:Label)"),
        Scenario::new(
            "match by missing label",
            "MATCH (n:Other) RETURN n",
            rows(Vec::<[&str; 1]>::new()),
        )
        .with_setup("CREATE (:Label)"),
        Scenario::new(
            "count relationships",
            "MATCH ()-[:KNOWS]->() RETURN count(*)",
            rows([["1"]]),
        )
        .with_setup("CREATE (a:Person {name:'Alice'}), (b:Person {name:'Bob'}), (a)-[:KNOWS]->(b)"),
        Scenario::new(
            "return star",
            "MATCH (n:Label) RETURN *",
            rows([["(:Label)"]]),
        )
        .with_setup("CREATE (:Label)"),
        Scenario::new(
            "return star on created node",
            "CREATE (n {name: 'A'}) RETURN *",
            rows([["({name: 'A'})"]]),
        ),
        Scenario::new(
            "return star without variables",
            "CREATE (), () RETURN *",
            Expectation::Error(ErrorKind::Compile),
        ),
        Scenario::new(
            "unbound relationship endpoint",
            "CREATE (a)-[:KNOWS]->(missing)",
            Expectation::Error(ErrorKind::Referential),
        ),
        Scenario::new(
            "unsupported clause",
            "MATCH (n) WITH n RETURN n",
            Expectation::Error(ErrorKind::Compile),
        ),
        Scenario::new(
            "optional match",
            "OPTIONAL MATCH (n) RETURN n",
            Expectation::Unimplemented,
        ),
    ]
}

#[test]
fn test_acceptance_scenarios_pass() {
    let scenarios = acceptance_scenarios();
    let report = run_all(&scenarios);
    assert!(report.is_success(), "{report}");
    assert_eq!(report.passed, 11);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.total(), scenarios.len());
}

#[test]
fn test_ordered_rows_compare_in_sequence() {
    let scenario = Scenario::new(
        "insertion order",
        "MATCH (n) RETURN n.i",
        Expectation::Rows {
            columns: Some(vec!["n.i".to_string()]),
            rows: vec![vec!["2".to_string()], vec!["1".to_string()]],
            ordered: true,
        },
    )
    .with_setup("CREATE ({i: 1})")
    .with_setup("CREATE ({i: 2})");
    assert!(matches!(
        run_scenario(&scenario),
        ScenarioOutcome::Failed { .. }
    ));

    let unordered = Scenario {
        expected: Expectation::Rows {
            columns: None,
            rows: vec![vec!["2".to_string()], vec!["1".to_string()]],
            ordered: false,
        },
        ..scenario
    };
    assert!(run_scenario(&unordered).is_passed());
}

#[test]
fn test_wrong_columns_fail() {
    let scenario = Scenario::new(
        "column names",
        "RETURN 1 AS x",
        Expectation::Rows {
            columns: Some(vec!["y".to_string()]),
            rows: vec![vec!["1".to_string()]],
            ordered: true,
        },
    );
    let ScenarioOutcome::Failed { reason } = run_scenario(&scenario) else {
        panic!("column mismatch should fail");
    };
    assert!(reason.contains("columns"), "{reason}");
}

#[test]
fn test_wrong_error_kind_fails() {
    let scenario = Scenario::new(
        "error kind",
        "MATCH (n) RETURN m",
        Expectation::Error(ErrorKind::Referential),
    );
    assert!(matches!(
        run_scenario(&scenario),
        ScenarioOutcome::Failed { .. }
    ));
}

#[test]
fn test_runtime_errors_are_matched_after_streaming() {
    let scenario = Scenario::new(
        "size of node",
        "MATCH (n) RETURN size(n)",
        Expectation::Error(ErrorKind::Query),
    )
    .with_setup("CREATE ()");
    assert!(run_scenario(&scenario).is_passed());
}

#[test]
fn test_failed_setup_is_reported() {
    let scenario =
        Scenario::new("bad setup", "RETURN 1", rows([["1"]])).with_setup("CREATE (a)-[:R]->(b)");
    let ScenarioOutcome::Failed { reason } = run_scenario(&scenario) else {
        panic!("setup failure should fail the scenario");
    };
    assert!(reason.contains("setup"), "{reason}");
}

#[test]
fn test_report_lists_failures() {
    let scenarios = vec![
        Scenario::new("ok", "RETURN 1", rows([["1"]])),
        Scenario::new("bad", "RETURN 1", rows([["2"]])),
    ];
    let report = run_all(&scenarios);
    assert!(!report.is_success());
    assert_eq!((report.passed, report.failed), (1, 1));
    assert_eq!(report.failures[0].0, "bad");
    assert!(report.to_string().contains("FAILED bad"));
}
