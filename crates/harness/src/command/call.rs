use std::env;
use std::fmt::Write as _;

use crate::{ConfigError, CONTROLLER_ENV_VAR, DEFAULT_CONTROLLER_INSTANCE};

/// Statically-known name of the test-controller instance registered with the
/// host. Replaces any runtime instance-name lookup: the handle is resolved
/// once at startup and an empty name is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerHandle {
    instance: String,
}

impl ControllerHandle {
    pub fn new(instance: impl Into<String>) -> Result<Self, ConfigError> {
        let instance = instance.into();
        if instance.trim().is_empty() {
            return Err(ConfigError::EmptyControllerName);
        }
        Ok(Self { instance })
    }

    /// Reads `EDPROBE_CONTROLLER`, falling back to the default instance name.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONTROLLER_ENV_VAR) {
            Ok(value) => Self::new(value),
            Err(env::VarError::NotPresent) => Self::new(DEFAULT_CONTROLLER_INSTANCE),
            Err(source) => Err(ConfigError::EnvVar {
                var: CONTROLLER_ENV_VAR,
                source,
            }),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CallArg {
    fn render_into(&self, out: &mut String) {
        match self {
            CallArg::Str(value) => {
                out.push('"');
                for ch in value.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(ch),
                    }
                }
                out.push('"');
            }
            CallArg::Int(value) => {
                let _ = write!(out, "{value}");
            }
            CallArg::Float(value) => {
                let _ = write!(out, "{value}");
            }
            CallArg::Bool(value) => {
                let _ = write!(out, "{value}");
            }
        }
    }
}

impl From<&str> for CallArg {
    fn from(value: &str) -> Self {
        CallArg::Str(value.to_string())
    }
}

impl From<String> for CallArg {
    fn from(value: String) -> Self {
        CallArg::Str(value)
    }
}

impl From<i64> for CallArg {
    fn from(value: i64) -> Self {
        CallArg::Int(value)
    }
}

impl From<u32> for CallArg {
    fn from(value: u32) -> Self {
        CallArg::Int(i64::from(value))
    }
}

impl From<f64> for CallArg {
    fn from(value: f64) -> Self {
        CallArg::Float(value)
    }
}

impl From<bool> for CallArg {
    fn from(value: bool) -> Self {
        CallArg::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A method on the registered test-controller instance.
    Controller { instance: String },
    /// A call into a host built-in namespace (which may be dotted).
    Builtin { namespace: String },
}

impl CallTarget {
    pub fn path(&self) -> &str {
        match self {
            CallTarget::Controller { instance } => instance,
            CallTarget::Builtin { namespace } => namespace,
        }
    }
}

/// A structured remote command: target, method, and typed arguments.
/// Immutable once built; rendering to the host call-string happens only at
/// the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub target: CallTarget,
    pub method: String,
    pub args: Vec<CallArg>,
    pub kwargs: Vec<(String, CallArg)>,
}

impl RemoteCall {
    pub fn controller(handle: &ControllerHandle, method: impl Into<String>) -> Self {
        Self {
            target: CallTarget::Controller {
                instance: handle.instance().to_string(),
            },
            method: method.into(),
            args: Vec::new(),
            kwargs: Vec::new(),
        }
    }

    pub fn builtin(namespace: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: CallTarget::Builtin {
                namespace: namespace.into(),
            },
            method: method.into(),
            args: Vec::new(),
            kwargs: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<CallArg>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<CallArg>) -> Self {
        self.kwargs.push((name.into(), value.into()));
        self
    }

    /// Renders the host call-string form `<target>.<method>(<args>)`.
    /// String arguments are double-quoted; everything else passes through its
    /// natural textual form. Keyword arguments follow positionals as
    /// `name=value`.
    pub fn render_wire(&self) -> String {
        let mut out = String::new();
        out.push_str(self.target.path());
        out.push('.');
        out.push_str(&self.method);
        out.push('(');
        let mut first = true;
        for arg in &self.args {
            if !first {
                out.push_str(", ");
            }
            first = false;
            arg.render_into(&mut out);
        }
        for (name, arg) in &self.kwargs {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(name);
            out.push('=');
            arg.render_into(&mut out);
        }
        out.push(')');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ControllerHandle {
        ControllerHandle::new("edprobe_controller").expect("handle")
    }

    #[test]
    fn empty_controller_name_is_rejected() {
        assert!(matches!(
            ControllerHandle::new("   "),
            Err(ConfigError::EmptyControllerName)
        ));
        assert!(matches!(
            ControllerHandle::new(""),
            Err(ConfigError::EmptyControllerName)
        ));
    }

    #[test]
    fn renders_controller_call_with_mixed_args() {
        let call = RemoteCall::controller(&handle(), "push_result")
            .arg(true)
            .arg("all good")
            .kwarg("retries", 3i64);
        assert_eq!(
            call.render_wire(),
            "edprobe_controller.push_result(true, \"all good\", retries=3)"
        );
    }

    #[test]
    fn renders_builtin_call_with_dotted_namespace() {
        let call = RemoteCall::builtin("host.ui", "notify")
            .kwarg("message", "hello")
            .kwarg("expire_duration", 1.5f64);
        assert_eq!(
            call.render_wire(),
            "host.ui.notify(message=\"hello\", expire_duration=1.5)"
        );
    }

    #[test]
    fn string_args_escape_quotes_and_backslashes() {
        let call = RemoteCall::controller(&handle(), "note").arg("say \"hi\" \\ bye");
        assert_eq!(
            call.render_wire(),
            "edprobe_controller.note(\"say \\\"hi\\\" \\\\ bye\")"
        );
    }

    #[test]
    fn no_arg_call_renders_empty_parens() {
        let call = RemoteCall::controller(&handle(), "check_error_log");
        assert_eq!(call.render_wire(), "edprobe_controller.check_error_log()");
    }

    #[test]
    fn whole_floats_render_without_fraction() {
        let call = RemoteCall::controller(&handle(), "set_scale").arg(2.0f64);
        assert_eq!(call.render_wire(), "edprobe_controller.set_scale(2)");
    }
}
