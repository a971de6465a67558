use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Classification category served by its own model and label list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Plant,
    Animal,
    Mushroom,
}

#[derive(Error, Debug, PartialEq)]
#[error("unknown domain `{0}`")]
pub struct UnknownDomain(pub String);

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Plant, Domain::Animal, Domain::Mushroom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Plant => "plant",
            Domain::Animal => "animal",
            Domain::Mushroom => "mushroom",
        }
    }
}

impl FromStr for Domain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plant" => Ok(Domain::Plant),
            "animal" => Ok(Domain::Animal),
            "mushroom" => Ok(Domain::Mushroom),
            other => Err(UnknownDomain(other.to_string())),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
