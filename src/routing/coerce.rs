//! Handler argument binding and coercion.
//!
//! # Responsibilities
//! - Describe handler parameters explicitly (name, declared type, default)
//! - Convert raw request values into the declared types
//! - Inject the live request where a handler asks for it
//!
//! # Coercion Rules
//! - `Int` / `Float`: numbers pass, numeric strings are parsed, anything else fails
//! - `Bool`: `1, true, on, yes` / `0, false, off, no` (case-insensitive), anything else fails
//! - `Str`: strings pass, scalars are stringified, structures pass through
//! - `Union`: branches are tried in order, the first success wins, otherwise
//!   the raw value passes through unchanged
//! - `null` stays `null` for every type

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::http::Request;
use crate::routing::error::CoercionError;

/// Merged request parameters: body over query over path over defaults.
pub type ParameterSet = Map<String, Value>;

/// Declared type of a handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    Bool,
    Str,
    /// Raw value, no conversion.
    Any,
    /// The live request object instead of a named value.
    Request,
    Union(Vec<ParamType>),
}

/// One formal parameter of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A coerced argument value.
#[derive(Debug, Clone)]
pub enum Arg {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Value(Value),
    Request(Arc<Request>),
}

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Arg::Float(v) => Some(*v),
            Arg::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Arg::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(v) => Some(v),
            _ => None,
        }
    }

    /// The argument as a JSON value. Requests have no JSON form.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Arg::Null => Some(Value::Null),
            Arg::Int(v) => Some(Value::from(*v)),
            Arg::Float(v) => Some(Value::from(*v)),
            Arg::Bool(v) => Some(Value::Bool(*v)),
            Arg::Str(v) => Some(Value::String(v.clone())),
            Arg::Value(v) => Some(v.clone()),
            Arg::Request(_) => None,
        }
    }
}

/// Arguments handed to a handler, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<(String, Arg)>,
    params: ParameterSet,
}

impl Args {
    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, arg)| arg)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Arg::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Arg::as_float)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Arg::as_bool)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Arg::as_str)
    }

    /// The injected request, if the handler declared one.
    pub fn request(&self) -> Option<&Request> {
        self.values.iter().find_map(|(_, arg)| match arg {
            Arg::Request(req) => Some(req.as_ref()),
            _ => None,
        })
    }

    /// The full merged parameter set the arguments were bound from.
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.values.iter().map(|(n, a)| (n.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Bind `params` to `specs`, coercing each value to its declared type.
pub fn bind(
    specs: &[ParamSpec],
    params: &ParameterSet,
    request: &Request,
) -> Result<Args, CoercionError> {
    let mut values = Vec::with_capacity(specs.len());
    let mut shared: Option<Arc<Request>> = None;

    for spec in specs {
        let arg = if spec.ty == ParamType::Request {
            let req = shared.get_or_insert_with(|| Arc::new(request.clone()));
            Arg::Request(req.clone())
        } else {
            match params.get(&spec.name).or(spec.default.as_ref()) {
                Some(raw) => coerce(&spec.name, raw, &spec.ty)?,
                None => Arg::Null,
            }
        };
        values.push((spec.name.clone(), arg));
    }

    Ok(Args {
        values,
        params: params.clone(),
    })
}

/// Convert a raw value to `ty`.
pub fn coerce(name: &str, raw: &Value, ty: &ParamType) -> Result<Arg, CoercionError> {
    if raw.is_null() {
        return Ok(Arg::Null);
    }

    match ty {
        ParamType::Int => to_int(raw).map(Arg::Int).ok_or_else(|| not_numeric(name, raw)),
        ParamType::Float => to_float(raw)
            .map(Arg::Float)
            .ok_or_else(|| not_numeric(name, raw)),
        ParamType::Bool => to_bool(raw).map(Arg::Bool).ok_or_else(|| {
            CoercionError::InvalidBool {
                name: name.to_string(),
                value: display(raw),
            }
        }),
        ParamType::Str => Ok(match raw {
            Value::String(s) => Arg::Str(s.clone()),
            Value::Number(n) => Arg::Str(n.to_string()),
            Value::Bool(true) => Arg::Str("1".to_string()),
            Value::Bool(false) => Arg::Str(String::new()),
            other => Arg::Value(other.clone()),
        }),
        ParamType::Any | ParamType::Request => Ok(Arg::Value(raw.clone())),
        ParamType::Union(branches) => Ok(branches
            .iter()
            .filter(|branch| **branch != ParamType::Request)
            .find_map(|branch| coerce(name, raw, branch).ok())
            .unwrap_or_else(|| Arg::Value(raw.clone()))),
    }
}

fn to_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn to_float(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn to_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

// 2^63, the first whole float past `i64::MAX`.
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

// Whole-valued floats only; `4.5` is not an integer.
fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < I64_UPPER {
        Some(f as i64)
    } else {
        None
    }
}

fn not_numeric(name: &str, raw: &Value) -> CoercionError {
    CoercionError::NotNumeric {
        name: name.to_string(),
        value: display(raw),
    }
}

fn display(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
