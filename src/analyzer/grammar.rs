use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use tracing::instrument;

use crate::ast::{IndexValue, Member, Node, Parameter, Parent, Program};

/// A primary before any postfix operator. A bare name is only meaningful
/// as the receiver of a member.
#[derive(Debug, Clone)]
enum Operand {
    ClassName(String),
    Node(Node),
}

impl Operand {
    fn into_parent(self) -> Parent {
        match self {
            Operand::ClassName(name) => Parent::Class(name),
            Operand::Node(node) => Parent::node(node),
        }
    }
}

enum Postfix {
    Field(String),
    Call(String, Vec<Parameter>),
    Index(Node),
}

#[instrument(level = "debug", skip(input))]
pub fn program(input: &str) -> IResult<&str, Program> {
    delimited(
        multispace0,
        terminated(
            separated_list1(ws(char(';')), expression),
            opt(ws(char(';'))),
        ),
        multispace0,
    )(input)
}

#[instrument(level = "debug", skip(input))]
pub fn expression(input: &str) -> IResult<&str, Node> {
    let (rest, first) = ws(operand)(input)?;
    let (rest, ops) = many0(postfix)(rest)?;
    let operand = ops.into_iter().fold(first, |current, op| {
        Operand::Node(match op {
            Postfix::Field(name) => Node::access(current.into_parent(), Member::Field(name)),
            Postfix::Call(name, parameters) => Node::access(
                current.into_parent(),
                Member::call(Node::call(name, parameters)),
            ),
            Postfix::Index(index) => Node::Index {
                parent: current.into_parent(),
                index: match index {
                    Node::Int { value } => IndexValue::Literal(value),
                    other => IndexValue::Node(Box::new(other)),
                },
            },
        })
    });
    match operand {
        Operand::Node(node) => Ok((rest, node)),
        Operand::ClassName(_) => Err(nom::Err::Failure(Error::new(input, ErrorKind::Verify))),
    }
}

fn postfix(input: &str) -> IResult<&str, Postfix> {
    alt((
        map(
            preceded(ws(char('.')), pair(identifier, opt(arguments))),
            |(name, arguments)| match arguments {
                Some(parameters) => Postfix::Call(name.to_string(), parameters),
                None => Postfix::Field(name.to_string()),
            },
        ),
        map(
            delimited(ws(char('[')), expression, ws(char(']'))),
            Postfix::Index,
        ),
    ))(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(array_literal, Operand::Node),
        map(string_literal, Operand::Node),
        map(float_literal, Operand::Node),
        map(int_literal, Operand::Node),
        map(accessor, Operand::Node),
        map(pair(identifier, opt(arguments)), |(name, arguments)| {
            match (name, arguments) {
                ("true", None) => Operand::Node(Node::Boolean { value: true }),
                ("false", None) => Operand::Node(Node::Boolean { value: false }),
                (name, Some(parameters)) => Operand::Node(Node::call(name, parameters)),
                (name, None) => Operand::ClassName(name.to_string()),
            }
        }),
    ))(input)
}

fn arguments(input: &str) -> IResult<&str, Vec<Parameter>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), parameter),
        ws(char(')')),
    )(input)
}

fn parameter(input: &str) -> IResult<&str, Parameter> {
    map(
        separated_pair(ws(identifier), char(':'), expression),
        |(name, value)| Parameter {
            parameter: name.to_string(),
            value,
        },
    )(input)
}

fn array_literal(input: &str) -> IResult<&str, Node> {
    map(
        delimited(
            ws(char('[')),
            terminated(
                separated_list0(ws(char(',')), expression),
                opt(ws(char(','))),
            ),
            ws(char(']')),
        ),
        |value| Node::Array { value },
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Node> {
    map(
        delimited(
            char('"'),
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                )),
            )),
            char('"'),
        ),
        |value: Option<String>| Node::String {
            value: value.unwrap_or_default(),
        },
    )(input)
}

fn float_literal(input: &str) -> IResult<&str, Node> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        |s: &str| s.parse::<f64>().map(|value| Node::Float { value }),
    )(input)
}

fn int_literal(input: &str) -> IResult<&str, Node> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i64>().map(|value| Node::Int { value })
    })(input)
}

/// `.field` or `.field.sub`.
fn accessor(input: &str) -> IResult<&str, Node> {
    map(
        recognize(pair(
            preceded(char('.'), identifier),
            many0(preceded(char('.'), identifier)),
        )),
        |field: &str| Node::Accessor {
            field: field.to_string(),
        },
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    let id_chars = |c: char| c.is_alphanumeric() || c == '_';
    let start_chars = |c: char| c.is_alphabetic() || c == '_';

    take_while1(start_chars)(input).and_then(|(rest, first)| {
        let (rest, others) = take_while(id_chars)(rest)?;
        Ok((rest, &input[..first.len() + others.len()]))
    })
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}
