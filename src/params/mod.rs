//! Parameter sets and lazily resolvable values.
//!
//! A [`ParamSet`] is one member of a sweep: a string-keyed mapping of
//! primitive values. Template fields that may depend on the parameter set
//! are expressed as [`Resolvable`] values and evaluated with
//! [`Resolvable::resolve`] once a concrete set is at hand.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepRunError};

/// A primitive parameter value.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// String value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One parameter assignment of a sweep.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Conversion from a [`ParamValue`] into a typed template value.
pub trait FromParamValue: Sized {
    /// Converts `value`, returning `None` if the value cannot represent
    /// `Self`.
    fn from_param(value: &ParamValue) -> Option<Self>;
}

impl FromParamValue for String {
    fn from_param(value: &ParamValue) -> Option<Self> {
        Some(value.to_string())
    }
}

impl FromParamValue for PathBuf {
    fn from_param(value: &ParamValue) -> Option<Self> {
        Some(Self::from(value.to_string()))
    }
}

impl FromParamValue for i64 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromParamValue for bool {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Transform applied to a looked-up parameter value.
pub type MapFn<T> = Arc<dyn Fn(&ParamValue) -> Result<T> + Send + Sync>;

/// Value computed from the whole parameter set.
pub type ComputeFn<T> = Arc<dyn Fn(&ParamSet) -> Result<T> + Send + Sync>;

/// A value that is either fixed or derived from a parameter set.
///
/// This is a closed set of variants; [`Resolvable::resolve`] is the single
/// dispatcher evaluating any of them against a concrete [`ParamSet`].
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use sweeprun::{ParamValue, Resolvable};
///
/// let params = BTreeMap::from([("size".to_string(), ParamValue::from(512))]);
/// let path: Resolvable<String> = Resolvable::format("stats_{size}.csv");
/// assert_eq!(path.resolve(&params).unwrap(), "stats_512.csv");
/// ```
#[derive(Clone)]
pub enum Resolvable<T> {
    /// A fixed value, independent of parameters.
    Literal(T),
    /// Looks up one parameter, with an optional fallback for a missing
    /// parameter.
    Param {
        /// Parameter name.
        name: String,
        /// Value used when the parameter is missing from the set.
        default: Option<T>,
    },
    /// Interpolates `{name}` placeholders with parameter values. Literal
    /// braces are written `{{` and `}}`.
    Format(String),
    /// Looks up one parameter and passes it through a transform.
    Map {
        /// Parameter name.
        name: String,
        /// Transform applied to the looked-up value.
        f: MapFn<T>,
    },
    /// Computed from the whole parameter set.
    Func(ComputeFn<T>),
}

impl<T> Resolvable<T> {
    /// A fixed value.
    pub fn literal(value: impl Into<T>) -> Self {
        Self::Literal(value.into())
    }

    /// A parameter lookup.
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param {
            name: name.into(),
            default: None,
        }
    }

    /// A parameter lookup falling back to `default` when the parameter is
    /// missing.
    pub fn param_or(name: impl Into<String>, default: T) -> Self {
        Self::Param {
            name: name.into(),
            default: Some(default),
        }
    }

    /// A `{name}` interpolation over the parameter set.
    pub fn format(template: impl Into<String>) -> Self {
        Self::Format(template.into())
    }

    /// A parameter lookup passed through `f`.
    pub fn map<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ParamValue) -> Result<T> + Send + Sync + 'static,
    {
        Self::Map {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// A value computed from the whole parameter set.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&ParamSet) -> Result<T> + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }
}

impl<T: FromParamValue + Clone> Resolvable<T> {
    /// Evaluates this value against `params`.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::ParamUnavailable`] when a referenced
    /// parameter is missing and no default applies, or any error raised by
    /// a transform or compute function.
    pub fn resolve(&self, params: &ParamSet) -> Result<T> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Param { name, default } => match params.get(name) {
                Some(value) => {
                    T::from_param(value).ok_or_else(|| SweepRunError::ParamUnavailable {
                        name: name.clone(),
                    })
                }
                None => default
                    .clone()
                    .ok_or_else(|| SweepRunError::ParamUnavailable { name: name.clone() }),
            },
            Self::Format(template) => {
                let rendered = interpolate(template, params)?;
                T::from_param(&ParamValue::Str(rendered)).ok_or_else(|| {
                    SweepRunError::ParamUnavailable {
                        name: template.clone(),
                    }
                })
            }
            Self::Map { name, f } => {
                let value = params
                    .get(name)
                    .ok_or_else(|| SweepRunError::ParamUnavailable { name: name.clone() })?;
                f(value)
            }
            Self::Func(f) => f(params),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Param { name, default } => f
                .debug_struct("Param")
                .field("name", name)
                .field("default", default)
                .finish(),
            Self::Format(template) => f.debug_tuple("Format").field(template).finish(),
            Self::Map { name, .. } => f.debug_struct("Map").field("name", name).finish_non_exhaustive(),
            Self::Func(_) => f.debug_tuple("Func").finish_non_exhaustive(),
        }
    }
}

impl<T> From<T> for Resolvable<T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Resolvable<String> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<&str> for Resolvable<PathBuf> {
    fn from(value: &str) -> Self {
        Self::Literal(PathBuf::from(value))
    }
}

/// Resolves every element of a slice against `params`.
///
/// # Errors
///
/// Propagates the first resolution error.
pub fn resolve_all<T: FromParamValue + Clone>(
    values: &[Resolvable<T>],
    params: &ParamSet,
) -> Result<Vec<T>> {
    values.iter().map(|value| value.resolve(params)).collect()
}

/// Renders `{name}` placeholders in `template` from `params`.
fn interpolate(template: &str, params: &ParamSet) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(SweepRunError::ParamUnavailable { name });
                        }
                    }
                }
                let value = params
                    .get(&name)
                    .ok_or_else(|| SweepRunError::ParamUnavailable { name: name.clone() })?;
                out.push_str(&value.to_string());
            }
            c => out.push(c),
        }
    }

    Ok(out)
}
