//! Expression and condition evaluation.
//!
//! Expressions are evaluated by phrase matching, not by a precedence
//! parser: the rules below are tried in a fixed order, the first match
//! wins, and its operands recurse through the same order. That order is
//! load-bearing: collection construction, text binding, indexing, and
//! ritual calls all outrank arithmetic, and the arithmetic phrases have no
//! precedence among themselves.

use crate::error::SpellError;
use crate::host::Host;
use crate::interpreter::Interpreter;
use crate::parser::{find_ci, parse_number, split_ci, strip_prefix_ci, whispers_literal};
use crate::value::Value;
use num_bigint::BigInt;
use num_traits::Zero;
use std::cmp::Ordering;

/// Arithmetic phrases, tried in order; the first one present in the
/// expression splits it.
const ARITHMETIC: [(&str, ArithmeticOp); 4] = [
    (" multiplied by ", ArithmeticOp::Multiply),
    (" divided by ", ArithmeticOp::Divide),
    (" greater by ", ArithmeticOp::Add),
    (" lesser by ", ArithmeticOp::Subtract),
];

#[derive(Debug, Clone, Copy)]
enum ArithmeticOp {
    Multiply,
    Divide,
    Add,
    Subtract,
}

impl ArithmeticOp {
    fn verb(self) -> &'static str {
        match self {
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
        }
    }
}

impl<H: Host> Interpreter<H> {
    /// Evaluate an expression phrase to a value.
    pub fn evaluate_expression(&mut self, expression: &str) -> Result<Value, SpellError> {
        let expression = expression.trim();

        // A whole-expression whispers literal is opaque: nothing inside
        // the quotes takes part in phrase matching.
        if let Some(text) = whispers_literal(expression) {
            return Ok(Value::Text(text.to_string()));
        }

        // Collection construction.
        if let Some(rest) = strip_prefix_ci(expression, "collection holding ") {
            return self.evaluate_collection(rest);
        }

        // Text binding: concatenate each part's default text form.
        if find_ci(expression, " bound with ").is_some() {
            let mut rendered = String::new();
            for part in split_ci(expression, " bound with ") {
                rendered.push_str(&self.evaluate_expression(part)?.to_string());
            }
            return Ok(Value::Text(rendered));
        }

        // Indexing.
        if let Some(at) = find_ci(expression, " at position ") {
            let name = expression[..at].trim();
            let index = self.expect_position(&expression[at + " at position ".len()..])?;
            let collection = self.expect_collection(name)?;
            let items = collection.borrow();
            let length = items.len();
            return match usize::try_from(index).ok().and_then(|i| items.get(i)) {
                Some(element) => Ok(element.clone()),
                None => Err(SpellError::Index(format!(
                    "position {index} is beyond a collection of length {length}"
                ))),
            };
        }

        // Collection length.
        if let Some(name) = strip_prefix_ci(expression, "length of ") {
            let collection = self.expect_collection(name.trim())?;
            let length = collection.borrow().len();
            return Ok(Value::Integer(BigInt::from(length)));
        }

        // Ritual call in value position.
        if let Some(rest) = strip_prefix_ci(expression, "through ritual ") {
            let (name, arguments) = split_call(rest);
            return self.call_ritual(name, arguments);
        }

        // Ritual call by textual substitution: the call's text form
        // replaces it and the whole expression is evaluated again.
        if let Some(at) = find_ci(expression, "invoke the ritual ") {
            let (name, arguments) = split_call(&expression[at + "invoke the ritual ".len()..]);
            let result = self.call_ritual(name, arguments)?;
            let substituted = format!("{}{}", &expression[..at], result);
            return self.evaluate_expression(&substituted);
        }

        // Arithmetic, in phrase order, no precedence.
        for (phrase, op) in ARITHMETIC {
            if let Some(at) = find_ci(expression, phrase) {
                let left = self.evaluate_expression(&expression[..at])?;
                let right = self.evaluate_expression(&expression[at + phrase.len()..])?;
                return apply_arithmetic(op, &left, &right);
            }
        }

        // Bound name; an unbound one falls through to the literal rules.
        if let Some(value) = self.variables.get(expression) {
            return Ok(value.clone());
        }

        // Number literal.
        if let Ok(value) = parse_number(expression) {
            return Ok(value);
        }

        // Truth literals.
        if expression.eq_ignore_ascii_case("truth") {
            return Ok(Value::Truth(true));
        }
        if expression.eq_ignore_ascii_case("falsehood") {
            return Ok(Value::Truth(false));
        }

        // A whispers literal that the opaque-span rule skipped (interior
        // quotes) still strips its delimiters here.
        if let Some(rest) = strip_prefix_ci(expression, "whispers of \"") {
            if let Some(inner) = rest.strip_suffix('"') {
                return Ok(Value::Text(inner.to_string()));
            }
        }

        // Anything else is itself, as text.
        Ok(Value::Text(expression.to_string()))
    }

    /// Elements split on `and`, except that a part opening with `through`
    /// starts a ritual-call element which keeps the remaining `and`s as
    /// its own argument separators.
    fn evaluate_collection(&mut self, elements: &str) -> Result<Value, SpellError> {
        let parts = split_ci(elements, " and ");
        let mut items = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            let part = part.trim();
            if strip_prefix_ci(part, "through ").is_some() {
                let call = parts[index..].join(" and ");
                items.push(self.evaluate_expression(call.trim())?);
                break;
            }
            items.push(self.evaluate_expression(part)?);
        }
        Ok(Value::list(items))
    }

    /// Evaluate a boolean phrase. Precedence, loosest first: `or`, `and`,
    /// `not`, comparison. `or` and `and` short-circuit left to right.
    pub fn evaluate_condition(&mut self, condition: &str) -> Result<bool, SpellError> {
        let condition = condition.trim();
        if find_ci(condition, " or ").is_some() {
            for clause in split_ci(condition, " or ") {
                if self.evaluate_condition(clause)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        if find_ci(condition, " and ").is_some() {
            for clause in split_ci(condition, " and ") {
                if !self.evaluate_condition(clause)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
        if let Some(rest) = strip_prefix_ci(condition, "not ") {
            return Ok(!self.evaluate_condition(rest)?);
        }
        if let Some(at) = find_ci(condition, " equals ") {
            let left = self.evaluate_expression(&condition[..at])?;
            let right = self.evaluate_expression(&condition[at + " equals ".len()..])?;
            return Ok(left.loosely_equals(&right));
        }
        if let Some(at) = find_ci(condition, " greater than ") {
            let left = self.evaluate_expression(&condition[..at])?;
            let right = self.evaluate_expression(&condition[at + " greater than ".len()..])?;
            return Ok(left.compare(&right)? == Ordering::Greater);
        }
        if let Some(at) = find_ci(condition, " less than ") {
            let left = self.evaluate_expression(&condition[..at])?;
            let right = self.evaluate_expression(&condition[at + " less than ".len()..])?;
            return Ok(left.compare(&right)? == Ordering::Less);
        }
        Ok(self.evaluate_expression(condition)?.truthy())
    }
}

/// Split `name with arguments` into the ritual name and its argument text.
fn split_call(call: &str) -> (&str, Option<&str>) {
    match find_ci(call, " with ") {
        Some(at) => (call[..at].trim(), Some(call[at + " with ".len()..].trim())),
        None => (call.trim(), None),
    }
}

/// Apply a phrase operator to two numeric operands. Integer pairs stay
/// integer, except division with a remainder, which falls through to
/// floating; any floating operand makes the result floating.
fn apply_arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> Result<Value, SpellError> {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        match op {
            ArithmeticOp::Multiply => return Ok(Value::Integer(a * b)),
            ArithmeticOp::Add => return Ok(Value::Integer(a + b)),
            ArithmeticOp::Subtract => return Ok(Value::Integer(a - b)),
            ArithmeticOp::Divide => {
                if b.is_zero() {
                    return Err(SpellError::ZeroDivision);
                }
                if (a % b).is_zero() {
                    return Ok(Value::Integer(a / b));
                }
            }
        }
    }
    let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
        return Err(SpellError::Type(format!(
            "cannot {} {} and {}",
            op.verb(),
            left.kind(),
            right.kind()
        )));
    };
    match op {
        ArithmeticOp::Multiply => Ok(Value::Floating(a * b)),
        ArithmeticOp::Add => Ok(Value::Floating(a + b)),
        ArithmeticOp::Subtract => Ok(Value::Floating(a - b)),
        ArithmeticOp::Divide if b == 0.0 => Err(SpellError::ZeroDivision),
        ArithmeticOp::Divide => Ok(Value::Floating(a / b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScriptedHost;

    fn interpreter() -> Interpreter<ScriptedHost> {
        Interpreter::new(ScriptedHost::default())
    }

    fn eval(interp: &mut Interpreter<ScriptedHost>, expression: &str) -> Value {
        interp.evaluate_expression(expression).expect("evaluation failed")
    }

    #[test]
    fn test_literals() {
        let mut interp = interpreter();
        assert_eq!(eval(&mut interp, "42").to_string(), "42");
        assert_eq!(eval(&mut interp, "3 point 5").to_string(), "3.5");
        assert_eq!(eval(&mut interp, "truth").to_string(), "True");
        assert_eq!(eval(&mut interp, "Falsehood").to_string(), "False");
        assert_eq!(eval(&mut interp, "whispers of \"hush\"").to_string(), "hush");
        assert_eq!(eval(&mut interp, "bare words").to_string(), "bare words");
    }

    #[test]
    fn test_whispers_shield_embedded_phrases() {
        let mut interp = interpreter();
        let value = eval(&mut interp, "whispers of \"2 greater by 2\"");
        assert_eq!(value.to_string(), "2 greater by 2");
        let value = eval(&mut interp, "whispers of \"this and that\"");
        assert_eq!(value.to_string(), "this and that");
    }

    #[test]
    fn test_arithmetic_has_no_precedence() {
        let mut interp = interpreter();
        assert_eq!(eval(&mut interp, "3 multiplied by 4").to_string(), "12");
        assert_eq!(eval(&mut interp, "10 lesser by 4").to_string(), "6");
        // `multiplied by` is matched first, so both sides of it are
        // evaluated as sub-expressions: (2 greater by 3) * 4.
        assert_eq!(eval(&mut interp, "2 greater by 3 multiplied by 4").to_string(), "20");
    }

    #[test]
    fn test_division_stays_integral_when_exact() {
        let mut interp = interpreter();
        assert!(matches!(eval(&mut interp, "8 divided by 2"), Value::Integer(_)));
        assert!(matches!(eval(&mut interp, "7 divided by 2"), Value::Floating(_)));
        assert_eq!(eval(&mut interp, "7 divided by 2").to_string(), "3.5");
        let err = interp.evaluate_expression("1 divided by 0").unwrap_err();
        assert_eq!(err, SpellError::ZeroDivision);
        let err = interp.evaluate_expression("1 divided by 0 point 0").unwrap_err();
        assert_eq!(err, SpellError::ZeroDivision);
    }

    #[test]
    fn test_arithmetic_rejects_non_numbers() {
        let mut interp = interpreter();
        let err = interp
            .evaluate_expression("whispers of \"a\" greater by 1")
            .unwrap_err();
        assert!(matches!(err, SpellError::Type(_)));
    }

    #[test]
    fn test_bound_with_concatenates_text_forms() {
        let mut interp = interpreter();
        interp.variables.insert("n".to_string(), Value::integer(7));
        let value = eval(&mut interp, "whispers of \"count \" bound with n bound with whispers of \"!\"");
        assert_eq!(value.to_string(), "count 7!");
    }

    #[test]
    fn test_collection_and_indexing() {
        let mut interp = interpreter();
        let list = eval(&mut interp, "collection holding 1 and 2 and whispers of \"x\"");
        interp.variables.insert("xs".to_string(), list);
        assert_eq!(eval(&mut interp, "xs at position 2").to_string(), "x");
        assert_eq!(eval(&mut interp, "length of xs").to_string(), "3");

        let err = interp.evaluate_expression("xs at position 3").unwrap_err();
        assert!(matches!(err, SpellError::Index(_)));
        let err = interp.evaluate_expression("xs at position falsehood").unwrap_err();
        assert!(matches!(err, SpellError::Type(_)));
        let err = interp.evaluate_expression("ys at position 0").unwrap_err();
        assert!(matches!(err, SpellError::Name(_)));
    }

    #[test]
    fn test_collection_keeps_trailing_ritual_call_whole() {
        let mut interp = interpreter();
        interp
            .execute_statement("Conjure ritual named sum with a and b to Return a greater by b.")
            .unwrap();
        let list = eval(&mut interp, "collection holding 1 and through ritual sum with 2 and 3");
        assert_eq!(list.to_string(), "[1, 5]");
    }

    #[test]
    fn test_invoke_substitutes_textually() {
        let mut interp = interpreter();
        interp
            .execute_statement("Conjure ritual named five to Return 5.")
            .unwrap();
        let value = eval(&mut interp, "2 multiplied by invoke the ritual five");
        assert_eq!(value.to_string(), "10");
    }

    #[test]
    fn test_condition_precedence_and_short_circuit() {
        let mut interp = interpreter();
        interp.variables.insert("n".to_string(), Value::integer(5));
        assert!(interp.evaluate_condition("n equals 5").unwrap());
        assert!(interp.evaluate_condition("n greater than 3").unwrap());
        assert!(!interp.evaluate_condition("n less than 3").unwrap());
        assert!(interp.evaluate_condition("not n less than 3").unwrap());
        // or is looser than and: truth or (falsehood and falsehood).
        assert!(interp.evaluate_condition("truth or falsehood and falsehood").unwrap());
        // Short-circuit: the unknown ritual on the right is never called.
        assert!(interp
            .evaluate_condition("n equals 5 or through ritual missing equals 1")
            .unwrap());
    }

    #[test]
    fn test_condition_falls_back_to_truthiness() {
        let mut interp = interpreter();
        interp.variables.insert("empty".to_string(), Value::Text(String::new()));
        interp.variables.insert("full".to_string(), Value::integer(2));
        assert!(!interp.evaluate_condition("empty").unwrap());
        assert!(interp.evaluate_condition("full").unwrap());
        assert!(!interp.evaluate_condition("falsehood").unwrap());
    }
}
