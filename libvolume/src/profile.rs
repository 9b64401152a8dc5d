//! Driver profiles.
//!
//! A [`Profile`] decides which create options are mandatory and which RPCs the
//! registry answers.  Older deployments only knew about a bucket and served a
//! reduced operation set; both are configuration here rather than protocol.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Option key naming the bucket to mount.  Always required.
pub const BUCKET_KEY: &str = "bucket";

/// Default option key naming the directory within the bucket.
pub const DEFAULT_SUBDIR_KEY: &str = "subdir";

/// Which create options must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionProfile {
    /// Only `bucket` is required; a subdirectory may still be given.
    Bucket,
    /// Both `bucket` and the subdirectory key are required.
    BucketSubdir,
}

impl FromStr for OptionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bucket" => Ok(Self::Bucket),
            "bucket-subdir" => Ok(Self::BucketSubdir),
            other => Err(format!(
                "unknown option profile {other:?} (expected `bucket` or `bucket-subdir`)"
            )),
        }
    }
}

/// A registry operation that a profile may enable or disable.
///
/// `Capabilities` is deliberately absent: it carries no state and is always
/// answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Create,
    Get,
    List,
    Remove,
    Path,
    Mount,
    Unmount,
}

impl Operation {
    /// Every operation, in RPC order.
    pub const ALL: [Operation; 7] = [
        Operation::Create,
        Operation::Get,
        Operation::List,
        Operation::Remove,
        Operation::Path,
        Operation::Mount,
        Operation::Unmount,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "Create",
            Self::Get => "Get",
            Self::List => "List",
            Self::Remove => "Remove",
            Self::Path => "Path",
            Self::Mount => "Mount",
            Self::Unmount => "Unmount",
        };
        f.write_str(name)
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown operation {s:?}"))
    }
}

/// Selects the required option keys and the enabled operation set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Required option set.
    pub options: OptionProfile,
    /// Option key holding the subdirectory (`subdir` unless overridden).
    pub subdir_key: String,
    /// Operations the registry will serve; the rest fail as not implemented.
    pub operations: BTreeSet<Operation>,
}

impl Profile {
    /// Bucket and subdirectory required, every operation enabled.
    pub fn full() -> Self {
        Self {
            options: OptionProfile::BucketSubdir,
            subdir_key: DEFAULT_SUBDIR_KEY.to_owned(),
            operations: Operation::ALL.into_iter().collect(),
        }
    }

    /// Bucket only; List, Remove, Path and Unmount are stubbed out.
    pub fn minimal() -> Self {
        Self {
            options: OptionProfile::Bucket,
            subdir_key: DEFAULT_SUBDIR_KEY.to_owned(),
            operations: BTreeSet::from([Operation::Create, Operation::Get, Operation::Mount]),
        }
    }

    /// Keys that must appear in a create request's options.
    pub fn required_keys(&self) -> Vec<&str> {
        match self.options {
            OptionProfile::Bucket => vec![BUCKET_KEY],
            OptionProfile::BucketSubdir => vec![BUCKET_KEY, self.subdir_key.as_str()],
        }
    }

    /// Whether `op` is served under this profile.
    pub fn is_enabled(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    /// Remove `op` from the enabled set.
    pub fn disable(&mut self, op: Operation) {
        self.operations.remove(&op);
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::full()
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::full()),
            "minimal" => Ok(Self::minimal()),
            other => Err(format!(
                "unknown profile {other:?} (expected `full` or `minimal`)"
            )),
        }
    }
}
