// Shared data types and small helpers used across crates.
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid id: {0}")]
    InvalidId(String),
}

pub mod ids {
    // Strongly typed IDs to avoid mixing principals and connections at compile time.
    use super::{Deserialize, Error, Result, Serialize};
    use std::fmt;
    use std::str::FromStr;

    macro_rules! id_type {
        ($name:ident) => {
            #[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                // Wrap an existing identifier string when decoding from storage.
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }

                pub fn into_string(self) -> String {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = Error;

                fn from_str(input: &str) -> Result<Self> {
                    // IDs are opaque strings; the only invalid value is the empty one.
                    if input.is_empty() {
                        return Err(Error::InvalidId(input.into()));
                    }
                    Ok(Self(input.into()))
                }
            }
        };
    }

    id_type!(PrincipalId);
    id_type!(ConnectionId);
}
