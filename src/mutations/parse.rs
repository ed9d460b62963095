//! Parsers for residue symbols and mutation text.
//!
//! The same grammar is used for mutation input (`RT:M184VI`) and for the mutation
//! predicates inside rule conditions (`184VI`, `69i`, `67d`).

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alphanumeric1, char, digit1, satisfy},
    combinator::{all_consuming, map_res, opt, value},
    multi::many1,
    sequence::terminated,
    IResult, Parser,
};

use super::{AMBIGUOUS, AMINO_ACIDS, DELETION, INSERTION, STOP};

/// Parsed pieces of a mutation, before semantic validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMutation<'a> {
    /// Optional gene prefix (`RT:`).
    pub gene: Option<&'a str>,
    /// Optional reference amino acid.
    pub reference: Option<char>,
    /// 1-based position; may be zero here and is rejected later.
    pub position: u32,
    /// Observed residues in input order.
    pub residues: Vec<char>,
}

/// Parse one residue symbol, resolving the insertion/deletion aliases.
pub fn residue(input: &str) -> IResult<&str, char> {
    alt((
        value(INSERTION, alt((tag("ins"), tag("i"), tag("_"), tag("#")))),
        value(DELETION, alt((tag("del"), tag("d"), tag("-"), tag("~")))),
        satisfy(|c| AMINO_ACIDS.contains(c) || c == STOP || c == AMBIGUOUS),
    ))
    .parse(input)
}

/// Parse a position number.
pub fn position(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>()).parse(input)
}

/// Parse `[REF]POS RESIDUES` without a gene prefix.
pub fn mutation_body(input: &str) -> IResult<&str, (Option<char>, u32, Vec<char>)> {
    let (input, reference) = opt(satisfy(|c| c.is_ascii_uppercase())).parse(input)?;
    let (input, pos) = position(input)?;
    let (input, residues) = many1(residue).parse(input)?;
    Ok((input, (reference, pos, residues)))
}

/// Parse a complete mutation token with optional gene prefix.
pub fn raw_mutation(input: &str) -> IResult<&str, RawMutation<'_>> {
    let (input, gene) = opt(terminated(alphanumeric1, char(':'))).parse(input)?;
    let (input, (reference, position, residues)) = mutation_body(input)?;
    Ok((
        input,
        RawMutation {
            gene,
            reference,
            position,
            residues,
        },
    ))
}

/// Parse a whole string as exactly one mutation token.
pub fn parse_raw_mutation(input: &str) -> Option<RawMutation<'_>> {
    all_consuming(raw_mutation)
        .parse(input)
        .ok()
        .map(|(_, raw)| raw)
}

#[cfg(test)]
mod test {
    use super::{parse_raw_mutation, residue, RawMutation};

    #[rstest::rstest]
    #[case("V", 'V')]
    #[case("*", '*')]
    #[case("X", 'X')]
    #[case("ins", '_')]
    #[case("i", '_')]
    #[case("#", '_')]
    #[case("del", '-')]
    #[case("d", '-')]
    #[case("~", '-')]
    fn residue_aliases(#[case] input: &str, #[case] expected: char) {
        assert_eq!(residue(input).map(|(_, c)| c).ok(), Some(expected));
    }

    #[rstest::rstest]
    #[case("B")]
    #[case("v")]
    #[case("")]
    fn residue_rejects(#[case] input: &str) {
        assert!(residue(input).is_err());
    }

    #[test]
    fn full_mutation() {
        assert_eq!(
            parse_raw_mutation("RT:M184VI"),
            Some(RawMutation {
                gene: Some("RT"),
                reference: Some('M'),
                position: 184,
                residues: vec!['V', 'I'],
            })
        );
    }

    #[test]
    fn bare_position_and_insertion() {
        assert_eq!(
            parse_raw_mutation("69T_"),
            Some(RawMutation {
                gene: None,
                reference: None,
                position: 69,
                residues: vec!['T', '_'],
            })
        );
        assert_eq!(
            parse_raw_mutation("67del").map(|raw| raw.residues),
            Some(vec!['-'])
        );
    }

    #[rstest::rstest]
    #[case("M184")]
    #[case("184 V")]
    #[case("RT:")]
    #[case("M184V,")]
    fn malformed(#[case] input: &str) {
        assert_eq!(parse_raw_mutation(input), None);
    }
}
