//! Condition expressions of the rule language.
//!
//! ```text
//! expr       := or
//! or         := and ("OR" and)*
//! and        := unary ("AND" unary)*
//! unary      := "NOT" unary | primary
//! primary    := "(" expr ")" | select | mutation
//! select     := "SELECT" quantifier "FROM" "(" mutation ("," mutation)* ")"
//! quantifier := "ATLEAST" n ["AND" "NOTMORETHAN" m] | "EXACTLY" n | "NOTMORETHAN" m
//! mutation   := [REF] POSITION RESIDUES
//! ```
//!
//! Keywords are case-insensitive.  Residues use the mutation grammar, so `69i`
//! and `69ins` both denote an insertion.

use std::collections::BTreeSet;

use itertools::Itertools as _;
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

use crate::{
    catalog,
    mutations::{format_residues, parse::mutation_body, AMBIGUOUS},
};

/// "Mutation at `position` with a residue in `aas`".
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct MutationPredicate {
    /// Optional reference amino acid as written in the rule.
    pub reference: Option<char>,
    /// 1-based position.
    pub position: u32,
    /// Residues any of which satisfies the predicate.
    pub aas: BTreeSet<char>,
}

impl std::fmt::Display for MutationPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(reference) = self.reference {
            write!(f, "{reference}")?;
        }
        write!(f, "{}{}", self.position, format_residues(&self.aas))
    }
}

/// Cardinality condition over a list of mutation predicates.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Select {
    /// Minimal number of matching positions.
    pub min: usize,
    /// Maximal number of matching positions, if bounded.
    pub max: Option<usize>,
    /// The candidate predicates.
    pub members: Vec<MutationPredicate>,
}

impl Select {
    /// Number of distinct positions among the members.
    pub fn distinct_positions(&self) -> usize {
        self.members
            .iter()
            .map(|member| member.position)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl std::fmt::Display for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SELECT ")?;
        match (self.min, self.max) {
            (min, Some(max)) if min == max => write!(f, "EXACTLY {min}")?,
            (0, Some(max)) => write!(f, "NOTMORETHAN {max}")?,
            (min, Some(max)) => write!(f, "ATLEAST {min} AND NOTMORETHAN {max}")?,
            (min, None) => write!(f, "ATLEAST {min}")?,
        }
        write!(f, " FROM ({})", self.members.iter().join(", "))
    }
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Single mutation predicate.
    Mutation(MutationPredicate),
    /// Cardinality threshold over mutation predicates.
    Select(Select),
    /// All children must hold.
    And(Vec<Condition>),
    /// Any child must hold.
    Or(Vec<Condition>),
    /// The child must not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// Parse a condition expression.
    ///
    /// # Errors
    ///
    /// Returns a description of the syntax error.
    pub fn parse(text: &str) -> Result<Self, String> {
        all_consuming(delimited(multispace0, expr, multispace0))
            .parse(text)
            .map(|(_, condition)| condition)
            .map_err(|e| match e {
                nom::Err::Error(e) | nom::Err::Failure(e) => {
                    let rest: String = e.input.chars().take(20).collect();
                    if rest.is_empty() {
                        format!("unexpected end of condition {text:?}")
                    } else {
                        format!("syntax error in condition {text:?} at {rest:?}")
                    }
                }
                nom::Err::Incomplete(_) => format!("incomplete condition {text:?}"),
            })
    }

    /// The mutation predicate, if this condition is a single one.
    pub fn as_mutation(&self) -> Option<&MutationPredicate> {
        match self {
            Condition::Mutation(predicate) => Some(predicate),
            _ => None,
        }
    }

    /// All mutation predicates in the expression, depth first.
    pub fn predicates(&self) -> Vec<&MutationPredicate> {
        let mut result = Vec::new();
        self.collect_predicates(&mut result);
        result
    }

    fn collect_predicates<'a>(&'a self, result: &mut Vec<&'a MutationPredicate>) {
        match self {
            Condition::Mutation(predicate) => result.push(predicate),
            Condition::Select(select) => result.extend(select.members.iter()),
            Condition::And(children) | Condition::Or(children) => children
                .iter()
                .for_each(|child| child.collect_predicates(result)),
            Condition::Not(child) => child.collect_predicates(result),
        }
    }

    /// All positions referenced by the expression.
    pub fn positions(&self) -> BTreeSet<u32> {
        self.predicates().into_iter().map(|p| p.position).collect()
    }

    /// Check the expression against the gene it is declared for.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem: positions outside of the gene,
    /// reference letters contradicting the consensus, ambiguous residues, or
    /// vacuous/unsatisfiable cardinality thresholds.
    pub fn validate(&self, gene: &catalog::Gene) -> Result<(), String> {
        for predicate in self.predicates() {
            if !gene.contains_position(predicate.position) {
                return Err(format!(
                    "position {} of {} is outside of gene {} (1..={})",
                    predicate.position, predicate, gene.name, gene.length
                ));
            }
            if predicate.aas.contains(&AMBIGUOUS) {
                return Err(format!(
                    "{predicate} uses the ambiguous residue {AMBIGUOUS}"
                ));
            }
            if let (Some(reference), Some(consensus)) =
                (predicate.reference, gene.consensus_at(predicate.position))
            {
                if reference != consensus {
                    return Err(format!(
                        "{} has reference {} but the {} consensus is {}",
                        predicate, reference, gene.name, consensus
                    ));
                }
            }
        }
        self.validate_selects()
    }

    fn validate_selects(&self) -> Result<(), String> {
        match self {
            Condition::Mutation(_) => Ok(()),
            Condition::Select(select) => {
                let n = select.distinct_positions();
                if let Some(max) = select.max {
                    if max < select.min {
                        return Err(format!("{select} has maximum below minimum"));
                    }
                }
                if select.min == 0 && select.max.map_or(true, |max| max >= n) {
                    return Err(format!("{select} is satisfied by any mutation set"));
                }
                if select.min > n {
                    return Err(format!(
                        "{select} requires {} positions but lists only {}",
                        select.min, n
                    ));
                }
                Ok(())
            }
            Condition::And(children) | Condition::Or(children) => children
                .iter()
                .try_for_each(|child| child.validate_selects()),
            Condition::Not(child) => child.validate_selects(),
        }
    }

    /// Render a child, adding parentheses where precedence requires them.
    fn fmt_child(&self, f: &mut std::fmt::Formatter<'_>, parent_is_or: bool) -> std::fmt::Result {
        match self {
            Condition::Or(_) => write!(f, "({self})"),
            Condition::And(_) if !parent_is_or => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Mutation(predicate) => write!(f, "{predicate}"),
            Condition::Select(select) => write!(f, "{select}"),
            Condition::And(children) | Condition::Or(children) => {
                let (separator, is_or) = match self {
                    Condition::Or(_) => (" OR ", true),
                    _ => (" AND ", false),
                };
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "{separator}")?;
                    }
                    child.fmt_child(f, is_or)?;
                }
                Ok(())
            }
            Condition::Not(child) => match child.as_ref() {
                Condition::And(_) | Condition::Or(_) => write!(f, "NOT ({child})"),
                _ => write!(f, "NOT {child}"),
            },
        }
    }
}

impl std::str::FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Keyword surrounded by optional whitespace.
fn keyword<'a>(
    kw: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    delimited(multispace0, tag_no_case(kw), multispace0)
}

fn count(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>()).parse(input)
}

fn expr(input: &str) -> IResult<&str, Condition> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(keyword("OR"), and_expr)).parse(input)?;
    Ok((input, combine(first, rest, Condition::Or)))
}

fn and_expr(input: &str) -> IResult<&str, Condition> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(keyword("AND"), unary)).parse(input)?;
    Ok((input, combine(first, rest, Condition::And)))
}

fn combine<F>(first: Condition, rest: Vec<Condition>, ctor: F) -> Condition
where
    F: FnOnce(Vec<Condition>) -> Condition,
{
    if rest.is_empty() {
        first
    } else {
        let mut children = Vec::with_capacity(rest.len() + 1);
        children.push(first);
        children.extend(rest);
        ctor(children)
    }
}

fn unary(input: &str) -> IResult<&str, Condition> {
    alt((
        map(preceded(keyword("NOT"), unary), |child| {
            Condition::Not(Box::new(child))
        }),
        primary,
    ))
    .parse(input)
}

fn primary(input: &str) -> IResult<&str, Condition> {
    delimited(
        multispace0,
        alt((
            delimited(char('('), expr, preceded(multispace0, char(')'))),
            map(select, Condition::Select),
            map(predicate, Condition::Mutation),
        )),
        multispace0,
    )
    .parse(input)
}

fn predicate(input: &str) -> IResult<&str, MutationPredicate> {
    map(mutation_body, |(reference, position, residues)| {
        MutationPredicate {
            reference,
            position,
            aas: residues.into_iter().collect(),
        }
    })
    .parse(input)
}

fn quantifier(input: &str) -> IResult<&str, (usize, Option<usize>)> {
    alt((
        (
            preceded(keyword("ATLEAST"), count),
            opt(preceded((keyword("AND"), keyword("NOTMORETHAN")), count)),
        ),
        map(preceded(keyword("EXACTLY"), count), |n| (n, Some(n))),
        map(preceded(keyword("NOTMORETHAN"), count), |n| (0, Some(n))),
    ))
    .parse(input)
}

fn select(input: &str) -> IResult<&str, Select> {
    let (input, _) = terminated(tag_no_case("SELECT"), multispace1).parse(input)?;
    let (input, (min, max)) = quantifier(input)?;
    let (input, _) = keyword("FROM").parse(input)?;
    let (input, members) = delimited(
        terminated(char('('), multispace0),
        separated_list1(keyword(","), predicate),
        preceded(multispace0, char(')')),
    )
    .parse(input)?;
    Ok((input, Select { min, max, members }))
}
