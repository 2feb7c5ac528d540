use fail::FailScenario;

/// Fail points configured for the lifetime of the scenario.
///
/// Scenarios are serialized process-wide, and every configured fail point is turned off when the
/// scenario is dropped.
pub struct TestFailScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> TestFailScenario<'a> {
    /// Configures each `(name, action)` pair, for example `("replication.output.stats", "return")`.
    pub fn setup(failpoints: &[(&str, &str)]) -> TestFailScenario<'a> {
        let scenario = FailScenario::setup();
        for (failpoint, action) in failpoints {
            fail::cfg(*failpoint, action).unwrap();
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints
                .iter()
                .map(|(failpoint, _)| failpoint.to_string())
                .collect(),
        }
    }
}

impl Drop for TestFailScenario<'_> {
    fn drop(&mut self) {
        for failpoint in &self.failpoints {
            fail::cfg(failpoint, "off").unwrap();
        }
    }
}
