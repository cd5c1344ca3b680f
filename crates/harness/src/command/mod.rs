mod call;
mod envelope;
mod parse;

pub use call::{CallArg, CallTarget, ControllerHandle, RemoteCall};
pub use envelope::{
    CommandEnvelope, EnvelopeArg, EnvelopeError, EnvelopeKwarg, EnvelopeTarget,
    ENVELOPE_FORMAT_VERSION,
};
pub use parse::{parse_wire_call, CallParseError, ParsedCall};
