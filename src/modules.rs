use std::{cmp::Ordering, fmt};
use tracing::{debug, info};

use crate::{env::AmbientEnv, error::LaunchError};

const LOADED_MODULES_VAR: &str = "LOADEDMODULES";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpiStack {
    Mvapich2,
    OpenMpi,
    Mpich2,
}

/// Module name prefixes, checked in order.
const STACK_PREFIXES: &[(&str, MpiStack)] = &[
    ("mvapich2", MpiStack::Mvapich2),
    ("openmpi", MpiStack::OpenMpi),
    ("mpich2", MpiStack::Mpich2),
    ("mpich", MpiStack::Mpich2),
];

impl MpiStack {
    fn from_module_name(name: &str) -> Option<Self> {
        let name = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
        STACK_PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, stack)| *stack)
    }
}

impl fmt::Display for MpiStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mvapich2 => "mvapich2",
            Self::OpenMpi => "openmpi",
            Self::Mpich2 => "mpich2",
        })
    }
}

/// Dotted release number, e.g. `1.8.4`; missing components compare as 0.
#[derive(Debug, Clone, Default, Eq)]
pub struct MpiVersion(Vec<u32>);

impl MpiVersion {
    pub fn new(parts: &[u32]) -> Self {
        Self(parts.to_vec())
    }

    /// Parse the leading numeric components, ignoring any suffix such as
    /// `-gcc` or `rc1`.
    pub fn parse(s: &str) -> Self {
        let mut parts = Vec::new();
        for component in s.split('.') {
            let digits = component
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>();
            match digits.parse() {
                Ok(n) => parts.push(n),
                Err(_) => break,
            }
            if digits.len() != component.len() {
                break;
            }
        }
        Self(parts)
    }

    fn component(&self, i: usize) -> u32 {
        self.0.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for MpiVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for MpiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for MpiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MpiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.0.iter().map(u32::to_string).collect::<Vec<_>>();
        f.write_str(&parts.join("."))
    }
}

/// The MPI stack selected by the loaded environment modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpiModule {
    pub stack: MpiStack,
    pub version: MpiVersion,
}

impl MpiModule {
    /// Find the first recognised MPI module in a `name/version:...` list.
    pub fn from_loaded(modules: &str) -> Result<Self, LaunchError> {
        modules
            .split(':')
            .filter(|m| !m.is_empty())
            .find_map(|token| {
                let (name, version) = token.rsplit_once('/').unwrap_or((token, ""));
                let stack = MpiStack::from_module_name(name)?;
                debug!(module = token, %stack, "Recognised MPI module");
                Some(Self {
                    stack,
                    version: MpiVersion::parse(version),
                })
            })
            .ok_or(LaunchError::NoMpiModuleLoaded)
    }

    pub fn detect(env: &AmbientEnv) -> Result<Self, LaunchError> {
        let modules = env
            .get(LOADED_MODULES_VAR)
            .ok_or(LaunchError::NoMpiModuleLoaded)?;
        let module = Self::from_loaded(modules)?;
        info!(stack = %module.stack, version = %module.version, "Detected MPI stack");
        Ok(module)
    }
}
