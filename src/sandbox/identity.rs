//! Sandbox identity and its inheritance.
//!
//! Every host carries a [`SandboxIdentity`], the out-of-band tag that attributes work to
//! a sandbox. Each execution context derives its own identity from the host's through an
//! [`InheritancePolicy`] evaluated once, when the context is spawned. Threads the script
//! creates for itself run inside that context and resolve to the same identity.

use std::fmt;

/// Default sandbox name used by [`HostEnvironment::create`](crate::sandbox::HostEnvironment::create).
pub const DEFAULT_SANDBOX_NAME: &str = "luaubox";

/// Out-of-band tag attributing execution to a sandbox.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SandboxIdentity {
    /// Name of the sandbox.
    pub name: String,
    /// Run number within the host. The host itself is run `0`.
    pub run: u64,
}

impl SandboxIdentity {
    /// Creates the root identity of a host.
    pub fn root(name: impl Into<String>) -> Self {
        SandboxIdentity {
            name: name.into(),
            run: 0,
        }
    }

    /// Returns `true` if this is a host identity rather than a context identity.
    pub fn is_root(&self) -> bool {
        self.run == 0
    }
}

impl fmt::Display for SandboxIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.run)
    }
}

/// Derives a context identity from its host's identity at spawn time.
pub trait InheritancePolicy: fmt::Debug {
    /// Returns the identity for the context spawned as run number `run`.
    fn inherit(&self, host: &SandboxIdentity, run: u64) -> SandboxIdentity;
}

/// Contexts keep the host's sandbox name and are numbered by run.
#[derive(Clone, Copy, Debug, Default)]
pub struct InheritFromHost;

impl InheritancePolicy for InheritFromHost {
    fn inherit(&self, host: &SandboxIdentity, run: u64) -> SandboxIdentity {
        SandboxIdentity {
            name: host.name.clone(),
            run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherit_keeps_name() {
        let host = SandboxIdentity::root("fuzz");
        let child = InheritFromHost.inherit(&host, 7);
        assert_eq!(child.name, "fuzz");
        assert_eq!(child.run, 7);
        assert!(host.is_root());
        assert!(!child.is_root());
        assert_eq!(child.to_string(), "fuzz#7");
    }
}
