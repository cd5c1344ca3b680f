use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::call::{CallArg, CallTarget, RemoteCall};

pub const ENVELOPE_FORMAT_VERSION: u32 = 1;

/// Versioned JSON transport form of a [`RemoteCall`]. This is the defined
/// encoding for hosts that accept structured messages; `render_wire` stays
/// the boundary format for hosts that only accept call strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub target: EnvelopeTarget,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<EnvelopeArg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kwargs: Vec<EnvelopeKwarg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvelopeTarget {
    Controller { instance: String },
    Builtin { namespace: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeArg {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeKwarg {
    pub name: String,
    pub value: EnvelopeArg,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to encode command envelope: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode command envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unsupported command envelope version {found} (supported: {ENVELOPE_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
}

impl From<&CallArg> for EnvelopeArg {
    fn from(value: &CallArg) -> Self {
        match value {
            CallArg::Str(inner) => EnvelopeArg::Str(inner.clone()),
            CallArg::Int(inner) => EnvelopeArg::Int(*inner),
            CallArg::Float(inner) => EnvelopeArg::Float(*inner),
            CallArg::Bool(inner) => EnvelopeArg::Bool(*inner),
        }
    }
}

impl From<EnvelopeArg> for CallArg {
    fn from(value: EnvelopeArg) -> Self {
        match value {
            EnvelopeArg::Str(inner) => CallArg::Str(inner),
            EnvelopeArg::Int(inner) => CallArg::Int(inner),
            EnvelopeArg::Float(inner) => CallArg::Float(inner),
            EnvelopeArg::Bool(inner) => CallArg::Bool(inner),
        }
    }
}

impl CommandEnvelope {
    pub fn from_call(call: &RemoteCall) -> Self {
        let target = match &call.target {
            CallTarget::Controller { instance } => EnvelopeTarget::Controller {
                instance: instance.clone(),
            },
            CallTarget::Builtin { namespace } => EnvelopeTarget::Builtin {
                namespace: namespace.clone(),
            },
        };
        Self {
            v: ENVELOPE_FORMAT_VERSION,
            target,
            method: call.method.clone(),
            args: call.args.iter().map(EnvelopeArg::from).collect(),
            kwargs: call
                .kwargs
                .iter()
                .map(|(name, value)| EnvelopeKwarg {
                    name: name.clone(),
                    value: EnvelopeArg::from(value),
                })
                .collect(),
        }
    }

    pub fn into_call(self) -> RemoteCall {
        let target = match self.target {
            EnvelopeTarget::Controller { instance } => CallTarget::Controller { instance },
            EnvelopeTarget::Builtin { namespace } => CallTarget::Builtin { namespace },
        };
        RemoteCall {
            target,
            method: self.method,
            args: self.args.into_iter().map(CallArg::from).collect(),
            kwargs: self
                .kwargs
                .into_iter()
                .map(|kwarg| (kwarg.name, CallArg::from(kwarg.value)))
                .collect(),
        }
    }

    pub fn encode_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    pub fn decode_json(raw: &str) -> Result<Self, EnvelopeError> {
        let envelope: CommandEnvelope =
            serde_json::from_str(raw).map_err(EnvelopeError::Decode)?;
        if envelope.v != ENVELOPE_FORMAT_VERSION {
            return Err(EnvelopeError::UnsupportedVersion { found: envelope.v });
        }
        Ok(envelope)
    }
}
