use std::fmt;

use thiserror::Error;

/// Condition names as stored in entry configuration rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    OutOfRange,
    SuperiorThan,
    InferiorThan,
    IncreasingStep,
    DecreasingStep,
}

impl ConditionKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "out of range" => Some(Self::OutOfRange),
            "superior than" => Some(Self::SuperiorThan),
            "inferior than" => Some(Self::InferiorThan),
            "increasing step" => Some(Self::IncreasingStep),
            "decreasing step" => Some(Self::DecreasingStep),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfRange => "out of range",
            Self::SuperiorThan => "superior than",
            Self::InferiorThan => "inferior than",
            Self::IncreasingStep => "increasing step",
            Self::DecreasingStep => "decreasing step",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unknown condition kind '{0}'")]
    UnknownKind(String),
    #[error("condition '{0}' has no implemented behavior")]
    UnsupportedKind(ConditionKind),
    #[error("invalid limits '{limits}' for condition '{kind}': {reason}")]
    InvalidLimits {
        kind: ConditionKind,
        limits: String,
        reason: String,
    },
}

/// One alarm rule bound to a monitored point.
///
/// Holds the raw limit string it was built from so a reload can compare the
/// stored configuration against the running instance. All variants are
/// immutable after construction except the increasing step, which tracks the
/// level the last sample landed in.
#[derive(Debug, Clone)]
pub struct Condition {
    kind: ConditionKind,
    limits: String,
    rule: Rule,
}

#[derive(Debug, Clone)]
enum Rule {
    OutOfRange { min: f64, max: f64 },
    SuperiorThan { limit: f64 },
    InferiorThan { limit: f64 },
    IncreasingStep { boundaries: Vec<f64>, level: usize },
}

impl Condition {
    pub fn new(kind: ConditionKind, limits: &str) -> Result<Self, ConditionError> {
        let limits = limits.trim();
        if limits.is_empty() {
            return Err(invalid(kind, limits, "limits must not be empty"));
        }

        let rule = match kind {
            ConditionKind::OutOfRange => {
                let (min, max) = parse_range(kind, limits)?;
                Rule::OutOfRange { min, max }
            }
            ConditionKind::SuperiorThan => Rule::SuperiorThan {
                limit: parse_number(kind, limits, limits)?,
            },
            ConditionKind::InferiorThan => Rule::InferiorThan {
                limit: parse_number(kind, limits, limits)?,
            },
            ConditionKind::IncreasingStep => Rule::IncreasingStep {
                boundaries: parse_boundaries(kind, limits)?,
                level: 0,
            },
            ConditionKind::DecreasingStep => {
                return Err(ConditionError::UnsupportedKind(kind));
            }
        };

        Ok(Self {
            kind,
            limits: limits.to_string(),
            rule,
        })
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    /// The raw limit string this condition was constructed from.
    pub fn limits(&self) -> &str {
        &self.limits
    }

    /// Evaluate one sample. Returns the expected-range description when the
    /// sample violates the rule, `None` otherwise.
    pub fn check(&mut self, value: f64) -> Option<String> {
        match &mut self.rule {
            Rule::OutOfRange { min, max } => {
                if value < *min || value > *max {
                    Some(format!("from {} to {}", min, max))
                } else {
                    None
                }
            }
            Rule::SuperiorThan { limit } => {
                if value > *limit {
                    Some(format!("value required to be lower than {}", limit))
                } else {
                    None
                }
            }
            Rule::InferiorThan { limit } => {
                if value < *limit {
                    Some(format!("value required to be higher than {}", limit))
                } else {
                    None
                }
            }
            Rule::IncreasingStep { boundaries, level } => {
                // A value exactly on a boundary belongs to the level above it.
                let new_level = boundaries.iter().take_while(|b| value >= **b).count();
                let previous = *level;
                *level = new_level;

                if new_level > previous {
                    return Some(format!("now at {}", describe_level(boundaries, new_level)));
                }
                if new_level < previous {
                    log::info!(
                        "step_level_decreased from={} to={} description={}",
                        previous,
                        new_level,
                        describe_level(boundaries, new_level)
                    );
                }
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn step_level(&self) -> Option<usize> {
        match &self.rule {
            Rule::IncreasingStep { level, .. } => Some(*level),
            _ => None,
        }
    }
}

fn describe_level(boundaries: &[f64], level: usize) -> String {
    if level == 0 {
        return format!("lowest level (0), values lesser than {}", boundaries[0]);
    }
    if level == boundaries.len() {
        return format!(
            "highest level ({}), values greater than {}",
            level,
            boundaries[level - 1]
        );
    }
    format!(
        "level ({}), values between {} and {}",
        level,
        boundaries[level - 1],
        boundaries[level]
    )
}

fn invalid(kind: ConditionKind, limits: &str, reason: impl Into<String>) -> ConditionError {
    ConditionError::InvalidLimits {
        kind,
        limits: limits.to_string(),
        reason: reason.into(),
    }
}

fn parse_number(kind: ConditionKind, limits: &str, piece: &str) -> Result<f64, ConditionError> {
    let piece = piece.trim();
    if piece.is_empty() {
        return Err(invalid(kind, limits, "empty numeric value"));
    }
    piece
        .parse::<f64>()
        .map_err(|_| invalid(kind, limits, format!("'{}' is not a number", piece)))
}

fn parse_range(kind: ConditionKind, limits: &str) -> Result<(f64, f64), ConditionError> {
    let mut pieces = limits.split(':');
    let (Some(min), Some(max), None) = (pieces.next(), pieces.next(), pieces.next()) else {
        return Err(invalid(kind, limits, "expected exactly 'min:max'"));
    };
    let min = parse_number(kind, limits, min)?;
    let max = parse_number(kind, limits, max)?;
    if min >= max {
        return Err(invalid(kind, limits, format!("{} < {} must hold", min, max)));
    }
    Ok((min, max))
}

fn parse_boundaries(kind: ConditionKind, limits: &str) -> Result<Vec<f64>, ConditionError> {
    let boundaries = limits
        .split(':')
        .map(|piece| parse_number(kind, limits, piece))
        .collect::<Result<Vec<f64>, _>>()?;

    for pair in boundaries.windows(2) {
        if pair[0] >= pair[1] {
            return Err(invalid(kind, limits, "boundaries must be strictly increasing"));
        }
    }
    Ok(boundaries)
}
