//! Typed parameter values and the pure token parsers that produce them.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, SweepError};

/// Typed value of a single swept parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    /// Signed integer token.
    Int(i64),
    /// Floating point token.
    Float(f64),
    /// Boolean token (`1/0`, `true/false`, `yes/no`, `on/off`).
    Bool(bool),
    /// Early-termination directive for the indexing stage.
    Quit(QuitAfter),
}

/// Early-termination directive: stop the orientation search once a bound
/// on considered reflections or accepted grains is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuitAfter {
    /// Run the search to completion.
    None,
    /// Consider at most this many predicted reflections per candidate.
    Hkls(u32),
    /// Stop once this many grains have been accepted.
    Grains(u32),
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Quit(v) => write!(f, "{v}"),
        }
    }
}

impl Display for QuitAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuitAfter::None => write!(f, "none"),
            QuitAfter::Hkls(n) => write!(f, "{n}-hkls"),
            QuitAfter::Grains(n) => write!(f, "{n}-grains"),
        }
    }
}

impl ParamValue {
    /// Returns the integer payload.
    ///
    /// Attr tables pair each parser with a setter of the same shape, so a
    /// variant mismatch is a bug in the table and panics.
    pub fn expect_int(&self) -> i64 {
        match self {
            ParamValue::Int(v) => *v,
            other => panic!("expected integer parameter, got {other}"),
        }
    }

    /// Returns the float payload; panics on a variant mismatch.
    pub fn expect_float(&self) -> f64 {
        match self {
            ParamValue::Float(v) => *v,
            other => panic!("expected float parameter, got {other}"),
        }
    }

    /// Returns the boolean payload; panics on a variant mismatch.
    pub fn expect_bool(&self) -> bool {
        match self {
            ParamValue::Bool(v) => *v,
            other => panic!("expected boolean parameter, got {other}"),
        }
    }

    /// Returns the quit directive payload; panics on a variant mismatch.
    pub fn expect_quit(&self) -> QuitAfter {
        match self {
            ParamValue::Quit(v) => *v,
            other => panic!("expected quit directive, got {other}"),
        }
    }
}

fn malformed(code: &str, token: &str, message: &str) -> SweepError {
    SweepError::Value(ErrorInfo::new(code, message).with_context("token", token))
}

/// Parses a signed integer token.
pub fn parse_int(token: &str) -> Result<ParamValue, SweepError> {
    token
        .parse::<i64>()
        .map(ParamValue::Int)
        .map_err(|err| {
            SweepError::Value(
                ErrorInfo::new("param-int", "token is not an integer")
                    .with_context("token", token)
                    .with_hint(err.to_string()),
            )
        })
}

/// Parses a floating point token.
pub fn parse_float(token: &str) -> Result<ParamValue, SweepError> {
    token
        .parse::<f64>()
        .map(ParamValue::Float)
        .map_err(|err| {
            SweepError::Value(
                ErrorInfo::new("param-float", "token is not a number")
                    .with_context("token", token)
                    .with_hint(err.to_string()),
            )
        })
}

/// Parses a boolean token. Accepted spellings, case-insensitive:
/// `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn parse_bool(token: &str) -> Result<ParamValue, SweepError> {
    match token.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(ParamValue::Bool(true)),
        "0" | "false" | "no" | "off" => Ok(ParamValue::Bool(false)),
        _ => Err(malformed(
            "param-bool",
            token,
            "token is not a recognised boolean",
        )),
    }
}

/// Parses a quit directive token: empty or `none`, `<n>-hkls`, `<n>-grains`.
pub fn parse_quit(token: &str) -> Result<ParamValue, SweepError> {
    if token.is_empty() || token.eq_ignore_ascii_case("none") {
        return Ok(ParamValue::Quit(QuitAfter::None));
    }
    let Some((count, unit)) = token.split_once('-') else {
        return Err(malformed(
            "param-quit",
            token,
            "quit directive must be `none` or `<n>-hkls` / `<n>-grains`",
        ));
    };
    let count: u32 = count.parse().map_err(|_| {
        malformed("param-quit", token, "quit directive count is not a number")
    })?;
    match unit {
        "hkls" => Ok(ParamValue::Quit(QuitAfter::Hkls(count))),
        "grains" => Ok(ParamValue::Quit(QuitAfter::Grains(count))),
        _ => Err(malformed(
            "param-quit",
            token,
            "quit directive unit must be `hkls` or `grains`",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_tokens() {
        assert_eq!(parse_bool("yes").unwrap(), ParamValue::Bool(true));
        assert_eq!(parse_bool("OFF").unwrap(), ParamValue::Bool(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn quit_directives() {
        assert_eq!(
            parse_quit("").unwrap(),
            ParamValue::Quit(QuitAfter::None)
        );
        assert_eq!(
            parse_quit("none").unwrap(),
            ParamValue::Quit(QuitAfter::None)
        );
        assert_eq!(
            parse_quit("50-hkls").unwrap(),
            ParamValue::Quit(QuitAfter::Hkls(50))
        );
        assert_eq!(
            parse_quit("3-grains").unwrap(),
            ParamValue::Quit(QuitAfter::Grains(3))
        );
    }

    #[test]
    fn quit_directive_rejects_malformed_tokens() {
        assert!(parse_quit("fifty-hkls").is_err());
        assert!(parse_quit("5-spots").is_err());
        assert!(parse_quit("grains").is_err());
    }

    #[test]
    fn display_round_trips_tokens() {
        assert_eq!(parse_quit("7-grains").unwrap().to_string(), "7-grains");
        assert_eq!(parse_float("2.5").unwrap().to_string(), "2.5");
        assert_eq!(parse_int("-3").unwrap().to_string(), "-3");
    }
}
