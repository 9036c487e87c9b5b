// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::get_num_cpus;
use crate::errors::ProcessesParseError;
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Type for the `processes` config key and the `--processes` option.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Processes {
    /// Run units with a specified number of processes.
    Count(usize),

    /// Run units with a number of processes equal to the logical CPU count.
    NumCpus,
}

impl Processes {
    /// Gets the actual number of processes computed at runtime. Always at least 1.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(processes) => processes.max(1),
            Self::NumCpus => get_num_cpus(),
        }
    }

    fn relative_to_num_cpus(delta: i64) -> Self {
        Self::Count((get_num_cpus() as i64 + delta).max(1) as usize)
    }
}

impl FromStr for Processes {
    type Err = ProcessesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<i64>() {
            Err(e) => Err(ProcessesParseError::new(s, e.to_string())),
            Ok(0) => Err(ProcessesParseError::new(s, "processes may not be 0")),
            Ok(j) if j < 0 => Ok(Self::relative_to_num_cpus(j)),
            Ok(j) => Ok(Self::Count(j as usize)),
        }
    }
}

impl fmt::Display for Processes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(processes) => write!(f, "{processes}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for Processes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = Processes;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a non-zero integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(Processes::NumCpus)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => Ok(Processes::Count(v as usize)),
                    Ordering::Less => Ok(Processes::relative_to_num_cpus(v)),
                    Ordering::Equal => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match i64::try_from(v) {
                    Ok(v) => self.visit_i64(v),
                    Err(_) => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
