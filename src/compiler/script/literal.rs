//! Evaluation of JavaScript object literals into JSON values.
//!
//! Only a literal grammar is accepted: objects, arrays, strings, template
//! strings without substitutions, numbers, booleans, `null`, `undefined` and
//! a handful of numeric constants. Anything else is rejected, nothing is
//! ever executed.

use oxc_ast::ast::{ArrayExpressionElement, Expression, ObjectPropertyKind, PropertyKey, PropertyKind};
use oxc_span::GetSpan;
use oxc_syntax::operator::UnaryOperator;
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

impl LiteralError {
    fn at(node: &impl GetSpan, message: impl Into<String>) -> Self {
        Self {
            offset: node.span().start as usize,
            message: message.into(),
        }
    }
}

/// Evaluates `expr`. `None` stands for `undefined`.
pub fn evaluate(expr: &Expression<'_>) -> Result<Option<Value>, LiteralError> {
    match expr {
        Expression::StringLiteral(s) => Ok(Some(Value::String(s.value.to_string()))),
        Expression::TemplateLiteral(t) if t.expressions.is_empty() => {
            let cooked = t.quasis.first().and_then(|q| q.value.cooked.as_ref());
            Ok(Some(Value::String(cooked.map(|c| c.to_string()).unwrap_or_default())))
        }
        Expression::NumericLiteral(n) => Ok(Some(number(n.value))),
        Expression::BooleanLiteral(b) => Ok(Some(Value::Bool(b.value))),
        Expression::NullLiteral(_) => Ok(Some(Value::Null)),
        Expression::Identifier(id) => match id.name.as_str() {
            "undefined" => Ok(None),
            "NaN" | "Infinity" => Ok(Some(Value::Null)),
            other => Err(LiteralError::at(&**id, format!("identifier '{other}' is not a literal"))),
        },
        Expression::UnaryExpression(u)
            if matches!(u.operator, UnaryOperator::UnaryNegation | UnaryOperator::UnaryPlus) =>
        {
            let negative = u.operator == UnaryOperator::UnaryNegation;
            match &u.argument {
                Expression::NumericLiteral(n) => Ok(Some(number(if negative { -n.value } else { n.value }))),
                Expression::Identifier(id) if id.name.as_str() == "Infinity" => Ok(Some(Value::Null)),
                other => Err(LiteralError::at(other, "expected a number")),
            }
        }
        Expression::ParenthesizedExpression(p) => evaluate(&p.expression),
        Expression::ArrayExpression(array) => {
            let mut items = Vec::with_capacity(array.elements.len());
            for element in array.elements.iter() {
                let item = match element {
                    ArrayExpressionElement::SpreadElement(spread) => {
                        return Err(LiteralError::at(&**spread, "spread is not allowed in literals"));
                    }
                    ArrayExpressionElement::Elision(_) => None,
                    _ => match element.as_expression() {
                        Some(expr) => evaluate(expr)?,
                        None => None,
                    },
                };
                items.push(item.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(items)))
        }
        Expression::ObjectExpression(object) => {
            let mut map = Map::new();
            for property in object.properties.iter() {
                let ObjectPropertyKind::ObjectProperty(prop) = property else {
                    return Err(LiteralError::at(property, "spread is not allowed in literals"));
                };
                if prop.computed || prop.method || prop.kind != PropertyKind::Init {
                    return Err(LiteralError::at(&**prop, "only plain properties are allowed in literals"));
                }
                let key = property_name(&prop.key)
                    .ok_or_else(|| LiteralError::at(&prop.key, "unsupported property key"))?;
                if let Some(value) = evaluate(&prop.value)? {
                    map.insert(key, value);
                }
            }
            Ok(Some(Value::Object(map)))
        }
        other => Err(LiteralError::at(other, "expressions are not allowed in literals")),
    }
}

/// The static name of a property key, `None` for computed keys.
pub fn property_name(key: &PropertyKey<'_>) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(s) => Some(s.value.to_string()),
        PropertyKey::NumericLiteral(n) => Some(n.value.to_string()),
        _ => None,
    }
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}
