// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::RunOrderParseError;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// The order in which pending units are handed out.
///
/// The order is applied once, after every unit has been enumerated and before the first one is
/// assigned.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunOrder {
    /// Discovery order.
    #[default]
    Default,

    /// Discovery order, reversed.
    Reverse,

    /// A seeded shuffle of the discovery order.
    Random {
        /// The seed. If absent, one is generated when the run starts.
        seed: Option<u64>,
    },
}

impl RunOrder {
    /// Returns string representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &["default", "reverse", "random", "random=SEED"]
    }

    /// Fills in a seed for [`Self::Random`] if one wasn't provided.
    ///
    /// The resolved order is reproducible: applying it twice to the same input gives the same
    /// result.
    pub fn resolve(self) -> Self {
        match self {
            Self::Random { seed: None } => Self::Random {
                seed: Some(rand::random()),
            },
            other => other,
        }
    }

    /// Returns the seed of a random order.
    pub fn seed(self) -> Option<u64> {
        match self {
            Self::Random { seed } => seed,
            Self::Default | Self::Reverse => None,
        }
    }

    /// Reorders `items` in place.
    ///
    /// An unresolved random order is shuffled with a fresh seed. Call [`Self::resolve`] first to
    /// make the result reproducible.
    pub fn apply<T>(self, items: &mut [T]) {
        match self.resolve() {
            Self::Default => {}
            Self::Reverse => items.reverse(),
            Self::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed.unwrap_or_default());
                items.shuffle(&mut rng);
            }
        }
    }
}

impl FromStr for RunOrder {
    type Err = RunOrderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "reverse" => Ok(Self::Reverse),
            "random" => Ok(Self::Random { seed: None }),
            other => match other.strip_prefix("random=") {
                Some(seed) => seed
                    .parse()
                    .map(|seed| Self::Random { seed: Some(seed) })
                    .map_err(|_| RunOrderParseError::new(other)),
                None => Err(RunOrderParseError::new(other)),
            },
        }
    }
}

impl fmt::Display for RunOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Reverse => write!(f, "reverse"),
            Self::Random { seed: None } => write!(f, "random"),
            Self::Random { seed: Some(seed) } => write!(f, "random={seed}"),
        }
    }
}

impl<'de> Deserialize<'de> for RunOrder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
