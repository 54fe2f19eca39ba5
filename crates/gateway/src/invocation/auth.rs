use crate::error::{GatewayError, Result};
use crate::model::AuthStrategy;
use base64::Engine as _;
use serde_json::{Map, Value};

/// Headers to inject plus the argument names that carried credentials.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct AuthMaterial {
    pub headers: Vec<(String, String)>,
    pub consumed: Vec<String>,
}

/// Argument names a strategy reads credentials from.
pub(crate) fn credential_args(strategy: &AuthStrategy) -> Vec<&str> {
    let names: [Option<&String>; 2] = match strategy {
        AuthStrategy::None => [None, None],
        AuthStrategy::Bearer { token_from_arg, .. } => [token_from_arg.as_ref(), None],
        AuthStrategy::ApiKey { value_from_arg, .. } => [value_from_arg.as_ref(), None],
        AuthStrategy::Basic {
            username_from_arg,
            password_from_arg,
            ..
        } => [username_from_arg.as_ref(), password_from_arg.as_ref()],
    };
    names.into_iter().flatten().map(String::as_str).collect()
}

fn arg_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Argument first, then the static value.
fn credential(
    args: &Map<String, Value>,
    from_arg: Option<&String>,
    fallback: Option<&String>,
) -> Option<String> {
    from_arg
        .and_then(|name| args.get(name))
        .and_then(arg_string)
        .or_else(|| fallback.filter(|s| !s.is_empty()).cloned())
}

fn missing(kind: &str, required: bool, from_arg: Option<&String>) -> Result<AuthMaterial> {
    if !required {
        return Ok(AuthMaterial::default());
    }
    let hint = from_arg.map_or_else(String::new, |a| format!(" (argument '{a}')"));
    Err(GatewayError::AuthConfiguration(format!(
        "required {kind} credential is missing{hint}"
    )))
}

/// Resolve auth headers for one call.
///
/// # Errors
///
/// Returns [`GatewayError::AuthConfiguration`] when a required credential is absent.
pub(crate) fn apply_auth(strategy: &AuthStrategy, args: &Map<String, Value>) -> Result<AuthMaterial> {
    let consumed: Vec<String> = credential_args(strategy)
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut material = match strategy {
        AuthStrategy::None => AuthMaterial::default(),
        AuthStrategy::Bearer {
            token,
            token_from_arg,
            required,
        } => match credential(args, token_from_arg.as_ref(), token.as_ref()) {
            Some(t) => AuthMaterial {
                headers: vec![("Authorization".to_string(), format!("Bearer {t}"))],
                consumed: Vec::new(),
            },
            None => missing("bearer", *required, token_from_arg.as_ref())?,
        },
        AuthStrategy::ApiKey {
            header_name,
            prefix,
            value,
            value_from_arg,
            required,
        } => match credential(args, value_from_arg.as_ref(), value.as_ref()) {
            Some(key) => {
                let header_value = match prefix.as_deref().map(str::trim) {
                    Some(p) if !p.is_empty() => format!("{p} {key}"),
                    _ => key,
                };
                AuthMaterial {
                    headers: vec![(header_name.clone(), header_value)],
                    consumed: Vec::new(),
                }
            }
            None => missing("API key", *required, value_from_arg.as_ref())?,
        },
        AuthStrategy::Basic {
            username,
            password,
            username_from_arg,
            password_from_arg,
            required,
        } => match credential(args, username_from_arg.as_ref(), username.as_ref()) {
            Some(user) => {
                let pass = credential(args, password_from_arg.as_ref(), password.as_ref())
                    .unwrap_or_default();
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                AuthMaterial {
                    headers: vec![("Authorization".to_string(), format!("Basic {encoded}"))],
                    consumed: Vec::new(),
                }
            }
            None => missing("basic", *required, username_from_arg.as_ref())?,
        },
    };
    material.consumed = consumed;
    Ok(material)
}
