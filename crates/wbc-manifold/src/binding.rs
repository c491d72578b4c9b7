//! Named external references and the handlers that route them.
//!
//! A binding's value type and handler are fixed when it is created; merging
//! two bindings under one name only grows the consumer list.  Position and
//! velocity of the same quantity are always two bindings, the velocity one
//! named with the `vel_` prefix.

use std::fmt;

use serde::{Deserialize, Serialize};
use wbc_types::{SignalRef, ValueType, WbcError};

/// Root of every planner channel built by the handlers.
pub const DEFAULT_BASE_PATH: &str = "/planner/target";

pub const VELOCITY_PREFIX: &str = "vel_";

/// Name of the velocity binding paired with `name`.
pub fn velocity_name(name: &str) -> String {
    format!("{VELOCITY_PREFIX}{name}")
}

/// Where a binding's values come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum SourceHandler {
    /// An explicit channel.  Names without a leading `/` are relative to the
    /// base path.
    DirectTopic { topic: String },
    /// Operational frame of planner joint `joint`.
    JointRelative { joint: String },
    /// Center of mass, optionally a named one.
    CenterOfMass { com: Option<String> },
    /// Pose of `frame1` relative to `frame0`, served by the frame graph.
    FramePair { frame0: String, frame1: String },
}

impl SourceHandler {
    pub fn tag(&self) -> &'static str {
        match self {
            SourceHandler::DirectTopic { .. } => "direct_topic",
            SourceHandler::JointRelative { .. } => "joint_relative",
            SourceHandler::CenterOfMass { .. } => "center_of_mass",
            SourceHandler::FramePair { .. } => "frame_pair",
        }
    }

    /// Build a handler from its tag and positional parameters.
    pub fn from_tag(tag: &str, params: &[&str]) -> Result<Self, WbcError> {
        let arity = |expected: usize| {
            if params.len() == expected {
                Ok(())
            } else {
                Err(WbcError::InvalidParameter {
                    name: tag.to_string(),
                    details: format!("expects {expected} parameter(s), got {}", params.len()),
                })
            }
        };
        match tag {
            "direct_topic" => {
                arity(1)?;
                Ok(SourceHandler::DirectTopic {
                    topic: params[0].to_string(),
                })
            }
            "joint_relative" => {
                arity(1)?;
                Ok(SourceHandler::JointRelative {
                    joint: params[0].to_string(),
                })
            }
            "center_of_mass" => match params {
                [] | [""] => Ok(SourceHandler::CenterOfMass { com: None }),
                [com] => Ok(SourceHandler::CenterOfMass {
                    com: Some(com.to_string()),
                }),
                _ => Err(WbcError::InvalidParameter {
                    name: tag.to_string(),
                    details: format!("expects at most 1 parameter, got {}", params.len()),
                }),
            },
            "frame_pair" => {
                arity(2)?;
                Ok(SourceHandler::FramePair {
                    frame0: params[0].to_string(),
                    frame1: params[1].to_string(),
                })
            }
            other => Err(WbcError::UnknownHandler(other.to_string())),
        }
    }

    /// External channel name for this handler.  Pure string construction.
    pub fn resolve(&self, velocity: bool, base_path: &str) -> String {
        let base = base_path.trim_end_matches('/');
        let mode = if velocity { "/velocity" } else { "" };
        match self {
            SourceHandler::DirectTopic { topic } if topic.starts_with('/') => topic.clone(),
            SourceHandler::DirectTopic { topic } => format!("{base}/{topic}"),
            SourceHandler::JointRelative { joint } => format!("{base}{mode}/op_frame/{joint}"),
            SourceHandler::CenterOfMass { com: None } => format!("{base}{mode}/com"),
            SourceHandler::CenterOfMass { com: Some(id) } => format!("{base}{mode}/com/{id}"),
            SourceHandler::FramePair { frame0, frame1 } => format!("{frame1}_wrt_{frame0}"),
        }
    }
}

impl fmt::Display for SourceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceHandler::DirectTopic { topic } => write!(f, "direct_topic({topic})"),
            SourceHandler::JointRelative { joint } => write!(f, "joint_relative({joint})"),
            SourceHandler::CenterOfMass { com } => {
                write!(f, "center_of_mass({})", com.as_deref().unwrap_or(""))
            }
            SourceHandler::FramePair { frame0, frame1 } => write!(f, "frame_pair({frame0}, {frame1})"),
        }
    }
}

/// A typed external input fanned out to a list of consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceBinding {
    value_type: ValueType,
    velocity: bool,
    handler: SourceHandler,
    consumers: Vec<SignalRef>,
}

impl ReferenceBinding {
    pub fn new(value_type: ValueType, velocity: bool, handler: SourceHandler) -> Self {
        Self {
            value_type,
            velocity,
            handler,
            consumers: Vec::new(),
        }
    }

    pub fn with_consumer(mut self, consumer: SignalRef) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_velocity(&self) -> bool {
        self.velocity
    }

    pub fn handler(&self) -> &SourceHandler {
        &self.handler
    }

    pub fn consumers(&self) -> &[SignalRef] {
        &self.consumers
    }

    /// Channel this binding reads from.
    pub fn channel(&self, base_path: &str) -> String {
        self.handler.resolve(self.velocity, base_path)
    }

    /// Fail unless `other` may be merged into `self` under `name`.
    pub fn check_compatible(&self, name: &str, other: &ReferenceBinding) -> Result<(), WbcError> {
        let conflict = |details: String| WbcError::BindingConflict {
            name: name.to_string(),
            details,
        };
        if self.value_type != other.value_type {
            return Err(conflict(format!(
                "value type {} vs {}",
                self.value_type, other.value_type
            )));
        }
        if self.handler != other.handler {
            return Err(conflict(format!("handler {} vs {}", self.handler, other.handler)));
        }
        if self.velocity != other.velocity {
            return Err(conflict(format!(
                "velocity flag {} vs {}",
                self.velocity, other.velocity
            )));
        }
        Ok(())
    }

    /// Append the consumers of a compatible binding.
    pub(crate) fn absorb(&mut self, other: &ReferenceBinding) {
        self.consumers.extend(other.consumers.iter().cloned());
    }
}
