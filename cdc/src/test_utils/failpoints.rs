use fail::FailScenario;

/// Fail points configured for the lifetime of the guard.
///
/// Holding the guard also serializes tests using fail points, since [`FailScenario`] takes a
/// process wide lock. Every configured fail point is turned off on drop.
pub struct FailPointsGuard<'a> {
    _scenario: FailScenario<'a>,
    names: Vec<String>,
}

impl<'a> FailPointsGuard<'a> {
    /// Configures each `(name, action)` pair, e.g. `("commit_key_delta.before_commit",
    /// "2*return(timed_retry)")`.
    ///
    /// Panics on an invalid action.
    pub fn setup(failpoints: &[(&str, &str)]) -> FailPointsGuard<'a> {
        let scenario = FailScenario::setup();

        let mut names = Vec::with_capacity(failpoints.len());
        for (name, action) in failpoints {
            if let Err(err) = fail::cfg(*name, action) {
                panic!("invalid action '{action}' for fail point '{name}': {err}");
            }
            names.push(name.to_string());
        }

        Self {
            _scenario: scenario,
            names,
        }
    }
}

impl Drop for FailPointsGuard<'_> {
    fn drop(&mut self) {
        for name in &self.names {
            fail::remove(name);
        }
    }
}
