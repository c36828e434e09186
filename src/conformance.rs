//! Scenario runner for TCK-style acceptance checks.
//!
//! A scenario is a list of setup statements, one query, and the expected
//! outcome: rows rendered in their textual form, an error kind, or an
//! "unimplemented" marker that is reported as ignored.

use std::fmt;

use tracing::{debug, info};

use crate::{
    engine::Engine,
    errors::{ErrorKind, GraphError},
    result::ResultSet,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Rows {
        /// Checked only when present.
        columns: Option<Vec<String>>,
        rows: Vec<Vec<String>>,
        ordered: bool,
    },
    Error(ErrorKind),
    Unimplemented,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub setup: Vec<String>,
    pub query: String,
    pub expected: Expectation,
}

impl Scenario {
    pub fn new<N: Into<String>, Q: Into<String>>(name: N, query: Q, expected: Expectation) -> Self {
        Self {
            name: name.into(),
            setup: Vec::new(),
            query: query.into(),
            expected,
        }
    }

    pub fn with_setup<S: Into<String>>(mut self, statement: S) -> Self {
        self.setup.push(statement.into());
        self
    }
}

/// Unordered rows expectation without a column check.
pub fn rows<R, C>(expected: R) -> Expectation
where
    R: IntoIterator<Item = C>,
    C: IntoIterator,
    C::Item: Into<String>,
{
    Expectation::Rows {
        columns: None,
        rows: expected
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect(),
        ordered: false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    Failed { reason: String },
    Ignored { reason: String },
}

impl ScenarioOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, ScenarioOutcome::Passed)
    }
}

/// Runs `scenario` on a fresh in-memory engine.
pub fn run_scenario(scenario: &Scenario) -> ScenarioOutcome {
    if scenario.expected == Expectation::Unimplemented {
        return ScenarioOutcome::Ignored {
            reason: "scenario is marked unimplemented".to_string(),
        };
    }
    let engine = match Engine::open_in_memory() {
        Ok(engine) => engine,
        Err(err) => {
            return ScenarioOutcome::Failed {
                reason: format!("could not open engine: {err}"),
            };
        }
    };
    for statement in &scenario.setup {
        if let Err(err) = engine.execute(statement).and_then(|r| r.materialize()) {
            return ScenarioOutcome::Failed {
                reason: format!("setup `{statement}` failed: {err}"),
            };
        }
    }
    let actual = engine
        .execute(&scenario.query)
        .and_then(|result| result.materialize());
    let outcome = judge(&scenario.expected, actual);
    debug!(scenario = %scenario.name, outcome = ?outcome, "conformance.scenario");
    outcome
}

fn judge(expected: &Expectation, actual: Result<ResultSet, GraphError>) -> ScenarioOutcome {
    match (expected, actual) {
        (Expectation::Unimplemented, _) => ScenarioOutcome::Ignored {
            reason: "scenario is marked unimplemented".to_string(),
        },
        (Expectation::Error(kind), Err(err)) if err.kind() == *kind => ScenarioOutcome::Passed,
        (Expectation::Error(kind), Err(err)) => ScenarioOutcome::Failed {
            reason: format!("expected {kind}, got {}: {err}", err.kind()),
        },
        (Expectation::Error(kind), Ok(result)) => ScenarioOutcome::Failed {
            reason: format!("expected {kind}, got {} rows", result.rows.len()),
        },
        (Expectation::Rows { .. }, Err(err)) => ScenarioOutcome::Failed {
            reason: format!("unexpected {}: {err}", err.kind()),
        },
        (
            Expectation::Rows {
                columns,
                rows,
                ordered,
            },
            Ok(result),
        ) => {
            if let Some(columns) = columns {
                if *columns != result.columns {
                    return ScenarioOutcome::Failed {
                        reason: format!(
                            "expected columns {columns:?}, got {:?}",
                            result.columns
                        ),
                    };
                }
            }
            let mut want = rows.clone();
            let mut got = result.rendered_rows();
            if !*ordered {
                want.sort();
                got.sort();
            }
            if want == got {
                ScenarioOutcome::Passed
            } else {
                ScenarioOutcome::Failed {
                    reason: format!("expected rows {want:?}, got {got:?}"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConformanceReport {
    pub passed: usize,
    pub failed: usize,
    pub ignored: usize,
    pub failures: Vec<(String, String)>,
}

impl ConformanceReport {
    pub fn record(&mut self, name: &str, outcome: &ScenarioOutcome) {
        match outcome {
            ScenarioOutcome::Passed => self.passed += 1,
            ScenarioOutcome::Ignored { .. } => self.ignored += 1,
            ScenarioOutcome::Failed { reason } => {
                self.failed += 1;
                self.failures.push((name.to_string(), reason.clone()));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.ignored
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scenarios: {} passed, {} failed, {} ignored",
            self.total(),
            self.passed,
            self.failed,
            self.ignored
        )?;
        for (name, reason) in &self.failures {
            write!(f, "\n  FAILED {name}: {reason}")?;
        }
        Ok(())
    }
}

pub fn run_all<'a, I>(scenarios: I) -> ConformanceReport
where
    I: IntoIterator<Item = &'a Scenario>,
{
    let mut report = ConformanceReport::default();
    for scenario in scenarios {
        let outcome = run_scenario(scenario);
        report.record(&scenario.name, &outcome);
    }
    info!(
        passed = report.passed,
        failed = report.failed,
        ignored = report.ignored,
        "conformance.report"
    );
    report
}
