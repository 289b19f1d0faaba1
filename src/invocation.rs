use std::{collections::BTreeMap, fmt};
use tracing::debug;

use crate::{env::AmbientEnv, launcher::Rendering, plan::LaunchPlan};

/// The final launcher command line and the environment it adds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn build(
        program: &str,
        rendering: Rendering,
        plan: &LaunchPlan,
        ambient: &AmbientEnv,
    ) -> Self {
        let Rendering { args: rendered, env } = rendering;

        let env = env
            .into_iter()
            .filter(|(key, value)| {
                let keep = !ambient.contains(key);
                if !keep {
                    debug!(
                        key = key.as_str(),
                        rendered = value.as_str(),
                        ambient = ambient.get(key),
                        "Keeping ambient value"
                    );
                }
                keep
            })
            .collect();

        let args = rendered
            .into_iter()
            .chain(plan.switches.iter().cloned())
            .chain(plan.command.iter().cloned())
            .collect();

        Self {
            program: program.to_string(),
            args,
            env,
        }
    }

    /// Argument vector, starting with the launcher itself.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}
