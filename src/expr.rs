//! Safe arithmetic expression evaluator (§4.B)
//!
//! Evaluates the grammar `E := T (('+'|'-') T)*; T := F (('*'|'/') F)*; F := INT | IDENT | '('
//! E ')'` over a context of previously-parsed integer field values. No general-purpose
//! expression language features (strings, comparisons, calls) are supported by design.
use std::collections::HashMap;

use winnow::{
    Parser as _,
    ascii::{digit1, space0},
    combinator::{alt, delimited, repeat},
    token::one_of,
};

use crate::error::ExprError;

/// A variable binding context for expression evaluation: field name -> integer value
pub type Context = HashMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn token(input: &mut &str) -> winnow::Result<Token> {
    delimited(
        space0,
        alt((
            digit1.try_map(|s: &str| s.parse::<i64>().map(Token::Int)),
            winnow::token::take_while(1.., ident_char).map(|s: &str| Token::Ident(s.to_owned())),
            one_of('+').value(Token::Plus),
            one_of('-').value(Token::Minus),
            one_of('*').value(Token::Star),
            one_of('/').value(Token::Slash),
            one_of('(').value(Token::LParen),
            one_of(')').value(Token::RParen),
        )),
        space0,
    )
    .parse_next(input)
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut input = text;
    let tokens: Vec<Token> = repeat(0.., token)
        .parse_next(&mut input)
        .map_err(|_| ExprError::ParseFailure(text.to_owned()))?;
    if !input.trim().is_empty() {
        return Err(ExprError::ParseFailure(text.to_owned()));
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Plus,
    Minus,
    Star,
    Slash,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Plus | Op::Minus => 1,
            Op::Star | Op::Slash => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rpn {
    Int(i64),
    Ident(String),
    Op(Op),
}

/// Shunting-yard: turn the flat token stream into Reverse Polish Notation
fn to_rpn(tokens: Vec<Token>) -> Result<Vec<Rpn>, ExprError> {
    let mut output = Vec::new();
    let mut ops: Vec<Token> = Vec::new();

    fn token_op(t: &Token) -> Option<Op> {
        match t {
            Token::Plus => Some(Op::Plus),
            Token::Minus => Some(Op::Minus),
            Token::Star => Some(Op::Star),
            Token::Slash => Some(Op::Slash),
            _ => None,
        }
    }

    for tok in tokens {
        match tok {
            Token::Int(n) => output.push(Rpn::Int(n)),
            Token::Ident(name) => output.push(Rpn::Ident(name)),
            Token::LParen => ops.push(Token::LParen),
            Token::RParen => {
                loop {
                    match ops.pop() {
                        Some(Token::LParen) => break,
                        Some(op) => {
                            let op = token_op(&op).expect("only operators and parens on stack");
                            output.push(Rpn::Op(op));
                        }
                        None => return Err(ExprError::ParseFailure("mismatched parens".into())),
                    }
                }
            }
            ref t @ (Token::Plus | Token::Minus | Token::Star | Token::Slash) => {
                let this_op = token_op(t).expect("checked above");
                while let Some(top) = ops.last() {
                    if *top == Token::LParen {
                        break;
                    }
                    let top_op = token_op(top).expect("only operators and parens on stack");
                    if top_op.precedence() >= this_op.precedence() {
                        output.push(Rpn::Op(top_op));
                        ops.pop();
                    } else {
                        break;
                    }
                }
                ops.push(tok);
            }
        }
    }
    while let Some(op) = ops.pop() {
        if op == Token::LParen {
            return Err(ExprError::ParseFailure("mismatched parens".into()));
        }
        output.push(Rpn::Op(token_op(&op).expect("only operators left")));
    }
    Ok(output)
}

/// Evaluate an arithmetic expression against a variable context.
///
/// `/` performs integer division truncating toward zero; dividing by zero is an error. The
/// final result must be non-negative to be usable as a byte length; negative results are
/// reported as [`ExprError::InvalidExprResult`] rather than silently clamped.
pub fn eval(text: &str, context: &Context) -> Result<i64, ExprError> {
    let tokens = tokenize(text)?;
    let rpn = to_rpn(tokens)?;
    let mut stack: Vec<i64> = Vec::new();
    for item in rpn {
        match item {
            Rpn::Int(n) => stack.push(n),
            Rpn::Ident(name) => {
                let value = context
                    .get(&name)
                    .copied()
                    .ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))?;
                stack.push(value);
            }
            Rpn::Op(op) => {
                let rhs = stack
                    .pop()
                    .ok_or_else(|| ExprError::ParseFailure(text.to_owned()))?;
                let lhs = stack
                    .pop()
                    .ok_or_else(|| ExprError::ParseFailure(text.to_owned()))?;
                let result = match op {
                    Op::Plus => lhs + rhs,
                    Op::Minus => lhs - rhs,
                    Op::Star => lhs * rhs,
                    Op::Slash => {
                        if rhs == 0 {
                            return Err(ExprError::DivisionByZero);
                        }
                        // integer division truncating toward zero, as Rust's `/` already does
                        lhs / rhs
                    }
                };
                stack.push(result);
            }
        }
    }
    match stack.as_slice() {
        [result] => {
            if *result < 0 {
                Err(ExprError::InvalidExprResult(*result))
            } else {
                Ok(*result)
            }
        }
        _ => Err(ExprError::ParseFailure(text.to_owned())),
    }
}

/// Check that an expression parses without evaluating it (used by the validator, §4.D item 5)
pub fn check_syntax(text: &str) -> Result<(), ExprError> {
    let tokens = tokenize(text)?;
    to_rpn(tokens).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, i64)]) -> Context {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn simple_addition() {
        assert_eq!(eval("1 + 2", &Context::new()), Ok(3));
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("2 + 3 * 4", &Context::new()), Ok(14));
        assert_eq!(eval("(2 + 3) * 4", &Context::new()), Ok(20));
    }

    #[test]
    fn identifiers() {
        assert_eq!(eval("total - 4", &ctx(&[("total", 10)])), Ok(6));
    }

    #[test]
    fn unknown_identifier() {
        assert_eq!(
            eval("missing", &Context::new()),
            Err(ExprError::UnknownIdentifier("missing".into()))
        );
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(
            eval("1 / 0", &Context::new()),
            Err(ExprError::DivisionByZero)
        );
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        assert_eq!(eval("7 / 2", &Context::new()), Ok(3));
    }

    #[test]
    fn negative_result_is_rejected() {
        assert_eq!(
            eval("2 - 10", &Context::new()),
            Err(ExprError::InvalidExprResult(-8))
        );
    }

    #[test]
    fn zero_is_allowed() {
        assert_eq!(eval("4 - 4", &Context::new()), Ok(0));
    }

    #[test]
    fn whitespace_is_insignificant() {
        assert_eq!(eval("  1+  2 ", &Context::new()), Ok(3));
    }
}
