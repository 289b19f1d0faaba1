use std::{collections::BTreeMap, env};

/// Thread count hint read by OpenMP runtimes.
pub const THREAD_HINT_VAR: &str = "OMP_NUM_THREADS";

/// Snapshot of the process environment, taken once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmbientEnv(BTreeMap<String, String>);

impl AmbientEnv {
    pub fn from_process() -> Self {
        // Non-UTF-8 variables cannot name anything we care about
        Self(
            env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The ambient thread count, if set to a positive integer.
    pub fn thread_hint(&self) -> Option<u32> {
        self.get(THREAD_HINT_VAR)
            .and_then(|v| v.trim().parse().ok())
            .filter(|n| *n > 0)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AmbientEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    use serial_test::serial;

    #[test]
    fn test_thread_hint() {
        let env = AmbientEnv::from_iter([(THREAD_HINT_VAR, "4")]);
        assert_eq!(env.thread_hint(), Some(4));
        let env = AmbientEnv::from_iter([(THREAD_HINT_VAR, "0")]);
        assert_eq!(env.thread_hint(), None);
        let env = AmbientEnv::from_iter([(THREAD_HINT_VAR, "many")]);
        assert_eq!(env.thread_hint(), None);
        assert_eq!(AmbientEnv::default().thread_hint(), None);
    }

    #[test]
    #[serial]
    fn test_from_process() {
        // SAFETY: serialized with every other test touching the environment
        unsafe { env::set_var("PBS_MPIRUN_TEST_VAR", "yes") };
        let ambient = AmbientEnv::from_process();
        // SAFETY: as above
        unsafe { env::remove_var("PBS_MPIRUN_TEST_VAR") };
        assert_eq!(ambient.get("PBS_MPIRUN_TEST_VAR"), Some("yes"));
        assert!(!AmbientEnv::from_process().contains("PBS_MPIRUN_TEST_VAR"));
    }
}
