//! Rule expression parsing and evaluation.
//!
//! Expressions are CEL programs evaluated against a JSON-shaped variable
//! environment. The engine only ever accepts boolean results; anything else
//! is a misconfigured rule and surfaces as an evaluation error.

use std::collections::HashMap;
use std::panic;

use cel_interpreter::objects::Key;
use cel_interpreter::{Context, Program, Value};
use serde_json::Value as Json;

use crate::error::{DomainError, DomainResult};

/// A parsed rule expression.
pub struct Expression {
    source: String,
    program: Program,
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .finish()
    }
}

impl Expression {
    /// Parses an expression source string.
    ///
    /// The underlying parser may panic on some malformed input; panics are
    /// caught and reported as parse errors so a bad rule produces a clean
    /// internal error instead of tearing down the request task.
    pub fn parse(source: &str) -> DomainResult<Self> {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| Program::compile(source)));

        let program = match result {
            Ok(Ok(program)) => program,
            Ok(Err(e)) => {
                return Err(DomainError::ExpressionParse {
                    expression: source.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_panic) => {
                return Err(DomainError::ExpressionParse {
                    expression: source.to_string(),
                    message: "parser encountered an internal error".to_string(),
                });
            }
        };

        Ok(Self {
            source: source.to_string(),
            program,
        })
    }

    /// The original source string.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression and requires a boolean result.
    pub fn evaluate_bool(&self, env: &Environment) -> DomainResult<bool> {
        let ctx = env.to_cel_context();

        let value = self
            .program
            .execute(&ctx)
            .map_err(|e| DomainError::ExpressionEval {
                expression: self.source.clone(),
                message: e.to_string(),
            })?;

        match value {
            Value::Bool(b) => Ok(b),
            _ => Err(DomainError::NonBooleanCondition {
                expression: self.source.clone(),
            }),
        }
    }
}

/// A variable environment for expression evaluation.
///
/// Variables are JSON values; they convert to CEL values at evaluation time.
#[derive(Debug, Default)]
pub struct Environment {
    variables: Vec<(String, Json)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to a JSON value. Later bindings shadow earlier ones.
    pub fn bind(&mut self, name: impl Into<String>, value: Json) -> &mut Self {
        let name = name.into();
        self.variables.retain(|(n, _)| *n != name);
        self.variables.push((name, value));
        self
    }

    fn to_cel_context(&self) -> Context<'_> {
        let mut ctx = Context::default();
        for (name, value) in &self.variables {
            // Names are unique by construction, so add_variable cannot fail
            // on duplicates.
            ctx.add_variable(name.as_str(), json_to_cel(value))
                .expect("binding a unique variable name cannot fail");
        }
        ctx
    }
}

/// Converts a JSON value into a CEL value.
///
/// Numbers become ints when they are exact integers, floats otherwise, so
/// comparisons inside expressions follow JSON's dynamic semantics.
fn json_to_cel(value: &Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(s.clone().into()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .map(json_to_cel)
                .collect::<Vec<_>>()
                .into(),
        ),
        Json::Object(map) => {
            let converted: HashMap<Key, Value> = map
                .iter()
                .map(|(k, v)| (Key::String(k.clone().into()), json_to_cel(v)))
                .collect();
            Value::Map(converted.into())
        }
    }
}
