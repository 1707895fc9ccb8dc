use serde::{Deserialize, Serialize};

use crate::ConfigError;

const DEFAULT_BINARY: &str = "git";

/// The program spawned for every invocation.
///
/// Either a plain program (`"git"`, `"/usr/local/bin/git"`) or a wrapper followed by one leading
/// argument (`["wsl", "git"]`). Serialized as a string or as a one/two element list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BinaryRepr", into = "BinaryRepr")]
pub struct BinarySpec {
    program: String,
    prefix: Option<String>,
}

impl BinarySpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix: None,
        }
    }

    /// `program` runs first and receives `prefix` ahead of the task arguments.
    pub fn wrapped(program: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix: Some(prefix.into()),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Rejects names outside `[drive:]` + `[A-Za-z0-9/.\_~-]`, which keeps shell metacharacters and
    /// whitespace out of the spawned program path.
    pub fn check_characters(&self) -> Result<(), ConfigError> {
        std::iter::once(self.program.as_str())
            .chain(self.prefix.as_deref())
            .find(|part| !is_plain_path(part))
            .map_or(Ok(()), |bad| Err(ConfigError::UnsafeBinary(bad.to_string())))
    }
}

impl Default for BinarySpec {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

fn is_plain_path(part: &str) -> bool {
    let rest = match part.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => &part[2..],
        _ => part,
    };
    !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '\\' | '_' | '~' | '-'))
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BinaryRepr {
    Single(String),
    List(Vec<String>),
}

impl TryFrom<BinaryRepr> for BinarySpec {
    type Error = ConfigError;

    fn try_from(repr: BinaryRepr) -> Result<Self, Self::Error> {
        match repr {
            BinaryRepr::Single(program) => Ok(Self::new(program)),
            BinaryRepr::List(parts) => {
                let len = parts.len();
                let mut parts = parts.into_iter();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(program), None, None) => Ok(Self::new(program)),
                    (Some(program), Some(prefix), None) => Ok(Self::wrapped(program, prefix)),
                    _ => Err(ConfigError::BinaryArity(len)),
                }
            }
        }
    }
}

impl From<BinarySpec> for BinaryRepr {
    fn from(spec: BinarySpec) -> Self {
        match spec.prefix {
            None => BinaryRepr::Single(spec.program),
            Some(prefix) => BinaryRepr::List(vec![spec.program, prefix]),
        }
    }
}
