//! Parsing typed answers to sub-step prompts

use crate::core::types::{HexId, ResourceKind};
use crate::interaction::{InputKind, InputValue};

/// Turn REPL words into a value for the prompt's kind
///
/// Hexes and paths are separated by spaces or commas: `answer 2.3 2.4`.
pub fn parse_answer(kind: &InputKind, args: &[&str]) -> Result<InputValue, String> {
    let words: Vec<&str> = args
        .iter()
        .flat_map(|a| a.split(','))
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .collect();

    match kind {
        InputKind::SelectHexes { .. } => Ok(InputValue::Hexes(hexes(words))),
        InputKind::DrawPath { .. } => Ok(InputValue::Path(hexes(words))),
        InputKind::SelectResource { .. } => {
            let word = single(&words)?;
            word.parse::<ResourceKind>().map(InputValue::Resource)
        }
        InputKind::SelectSettlement => {
            single(&words).map(|w| InputValue::Settlement(w.to_string()))
        }
        InputKind::SelectArmy => single(&words).map(|w| InputValue::Army(w.to_string())),
        InputKind::ChooseAmount { .. } => {
            let word = single(&words)?;
            word.parse::<i32>()
                .map(InputValue::Amount)
                .map_err(|_| format!("'{}' is not a number", word))
        }
    }
}

fn hexes(words: Vec<&str>) -> Vec<HexId> {
    words.into_iter().map(HexId::from).collect()
}

fn single<'a>(words: &[&'a str]) -> Result<&'a str, String> {
    match words {
        [word] => Ok(*word),
        [] => Err("expected a value".into()),
        _ => Err("expected exactly one value".into()),
    }
}

/// Short hint shown next to a prompt
pub fn describe_kind(kind: &InputKind) -> String {
    match kind {
        InputKind::SelectHexes { count } => format!("up to {} hex id(s)", count),
        InputKind::SelectResource { options } => {
            let names: Vec<String> = options.iter().map(|r| r.to_string()).collect();
            format!("one of: {}", names.join(", "))
        }
        InputKind::SelectSettlement => "a settlement id".into(),
        InputKind::SelectArmy => "an army id".into(),
        InputKind::DrawPath { max_length } => format!("a path of up to {} hexes", max_length),
        InputKind::ChooseAmount { min, max } => format!("a number {}..={}", min, max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexes_accept_commas_and_spaces() {
        let kind = InputKind::SelectHexes { count: 3 };
        let value = parse_answer(&kind, &["2.3,2.4", "2.5"]).unwrap();
        assert_eq!(value, InputValue::Hexes(vec!["2.3".into(), "2.4".into(), "2.5".into()]));
    }

    #[test]
    fn test_resource_must_be_single_known_name() {
        let kind = InputKind::SelectResource {
            options: vec![ResourceKind::Lumber],
        };
        assert_eq!(
            parse_answer(&kind, &["lumber"]).unwrap(),
            InputValue::Resource(ResourceKind::Lumber)
        );
        assert!(parse_answer(&kind, &["lumber", "ore"]).is_err());
        assert!(parse_answer(&kind, &["mithral"]).is_err());
    }

    #[test]
    fn test_amount_parses_integer() {
        let kind = InputKind::ChooseAmount { min: 0, max: 5 };
        assert_eq!(parse_answer(&kind, &["3"]).unwrap(), InputValue::Amount(3));
        assert!(parse_answer(&kind, &["three"]).is_err());
    }
}
