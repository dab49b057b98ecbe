//! Searching for short flag expressions that reproduce a line group's
//! presence across every variant.
//!
//! A candidate is a token sequence evaluated right to left with
//! short-circuiting, so `A & B | C` means "C, or else both A and B". The
//! greedy pass appends the locally best token per round; a brute-force
//! counter pass runs afterwards only when the greedy result is imperfect.
use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// How a token combines with everything to its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Initial,
    And,
    Or,
}

/// One literal of a candidate expression.
/// `flag` and `value` index into the owning [FlagDefinition].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchToken {
    pub join: JoinKind,
    pub negative: bool,
    pub flag: usize,
    pub value: usize,
}

/// The flags that can discriminate between variants in one context,
/// with their observed values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlagDefinition {
    pub flags: Vec<(String, Vec<String>)>,
}

impl FlagDefinition {
    /// Collects `name -> values` from the given assignments, dropping
    /// single-valued flags and biasing on-like values to the front.
    pub fn from_assignments<'a>(
        assignments: impl Iterator<Item = &'a IndexMap<String, String>>,
    ) -> Self {
        let mut flags: IndexMap<String, Vec<String>> = IndexMap::new();
        for assignment in assignments {
            for (name, value) in assignment {
                let values = flags.entry(name.clone()).or_default();
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }

        flags.retain(|_, values| values.len() > 1);

        // On-like values first and off-like values last keeps the greedy
        // search stable and the output readable.
        for values in flags.values_mut() {
            values.sort_by_key(|value| match value.as_str() {
                "On" | "Enabled" => 0,
                "Off" | "Disabled" => 2,
                _ => 1,
            });
        }

        Self {
            flags: flags.into_iter().collect(),
        }
    }

    fn pair_count(&self) -> usize {
        self.flags.iter().map(|(_, values)| values.len()).sum()
    }

    fn pair(&self, index: usize) -> (usize, usize) {
        let mut remaining = index;
        for (flag, (_, values)) in self.flags.iter().enumerate() {
            if remaining < values.len() {
                return (flag, remaining);
            }
            remaining -= values.len();
        }
        unreachable!("pair index out of range")
    }
}

/// One line group's search task: find a sequence matching `expected` on
/// every assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInput {
    pub cases: Vec<(bool, IndexMap<String, String>)>,
    pub definition: FlagDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub tokens: Vec<SearchToken>,
    pub score: usize,
    pub total: usize,
}

impl SearchResult {
    pub fn is_perfect(&self) -> bool {
        self.score == self.total
    }
}

/// Right-to-left short-circuit evaluation.
pub fn evaluate(
    tokens: &[SearchToken],
    assignment: &IndexMap<String, String>,
    definition: &FlagDefinition,
) -> bool {
    for token in tokens.iter().rev() {
        let (name, values) = &definition.flags[token.flag];
        let truth = (assignment.get(name) == Some(&values[token.value])) != token.negative;
        match token.join {
            JoinKind::And if !truth => return false,
            JoinKind::Or if truth => return true,
            JoinKind::Initial => return truth,
            _ => {}
        }
    }
    false
}

fn score(tokens: &[SearchToken], input: &SearchInput) -> usize {
    input
        .cases
        .iter()
        .filter(|(expected, assignment)| {
            evaluate(tokens, assignment, &input.definition) == *expected
        })
        .count()
}

/// Appends the best-scoring token per round until perfect or out of
/// rounds. Candidate order is negation, then join, then flag, then value;
/// ties keep the earliest candidate.
fn greedy_search(input: &SearchInput) -> SearchResult {
    let total = input.cases.len();
    let rounds = input.definition.flags.len() + 5;

    let mut sequence: Vec<SearchToken> = Vec::new();
    let mut best = SearchResult {
        tokens: Vec::new(),
        score: score(&[], input),
        total,
    };

    for _ in 0..rounds {
        let mut round_best: Option<(SearchToken, usize)> = None;

        for negative in [false, true] {
            let joins: &[JoinKind] = if sequence.is_empty() {
                &[JoinKind::Initial]
            } else {
                &[JoinKind::And, JoinKind::Or]
            };
            for join in joins {
                for flag in 0..input.definition.flags.len() {
                    for value in 0..input.definition.flags[flag].1.len() {
                        let token = SearchToken {
                            join: *join,
                            negative,
                            flag,
                            value,
                        };
                        sequence.push(token);
                        let candidate_score = score(&sequence, input);
                        sequence.pop();

                        if round_best.map_or(true, |(_, s)| candidate_score > s) {
                            round_best = Some((token, candidate_score));
                        }
                    }
                }
            }
        }

        let Some((token, round_score)) = round_best else {
            break;
        };
        sequence.push(token);

        if round_score > best.score {
            best = SearchResult {
                tokens: sequence.clone(),
                score: round_score,
                total,
            };
        }
        if round_score == total {
            break;
        }
    }

    best
}

/// Enumerates token sequences like digits of a variable-length counter
/// until exhaustion or the deadline, keeping the best score seen.
fn brute_force_search(input: &SearchInput, timeout: Duration) -> SearchResult {
    let total = input.cases.len();
    let pairs = input.definition.pair_count();
    let mut best = SearchResult {
        tokens: Vec::new(),
        score: score(&[], input),
        total,
    };
    if pairs == 0 {
        return best;
    }

    // Beyond one token per assignment the cover cannot improve.
    let max_length = total + 2;
    let initial_digits = 2 * pairs;
    let other_digits = 4 * pairs;
    let digit_limit = |position: usize| {
        if position == 0 {
            initial_digits
        } else {
            other_digits
        }
    };

    let decode = |position: usize, digit: usize| {
        // Same candidate order as the greedy pass:
        // negation, join, flag, value.
        let joins: &[JoinKind] = if position == 0 {
            &[JoinKind::Initial]
        } else {
            &[JoinKind::And, JoinKind::Or]
        };
        let negative = digit / (joins.len() * pairs) == 1;
        let remainder = digit % (joins.len() * pairs);
        let join = joins[remainder / pairs];
        let (flag, value) = input.definition.pair(remainder % pairs);
        SearchToken {
            join,
            negative,
            flag,
            value,
        }
    };

    let started = Instant::now();
    let mut digits = vec![0usize];
    let mut iterations = 0u64;

    loop {
        let tokens: Vec<SearchToken> = digits
            .iter()
            .enumerate()
            .map(|(position, digit)| decode(position, *digit))
            .collect();
        let candidate_score = score(&tokens, input);
        if candidate_score > best.score
            || (candidate_score == best.score && tokens.len() < best.tokens.len())
        {
            best = SearchResult {
                tokens,
                score: candidate_score,
                total,
            };
            if best.is_perfect() {
                return best;
            }
        }

        iterations += 1;
        if iterations % 1024 == 0 && started.elapsed() >= timeout {
            return best;
        }

        // Increment the counter, growing on full carry.
        let mut position = digits.len();
        loop {
            if position == 0 {
                digits = vec![0; digits.len() + 1];
                if digits.len() > max_length {
                    return best;
                }
                break;
            }
            position -= 1;
            digits[position] += 1;
            if digits[position] < digit_limit(position) {
                break;
            }
            digits[position] = 0;
        }
    }
}

/// Runs the greedy pass, falling back to brute force when imperfect.
/// The slow result wins only on a strictly better score or an equal score
/// with fewer tokens.
pub fn search(input: &SearchInput, timeout: Duration) -> SearchResult {
    let fast = greedy_search(input);
    if fast.is_perfect() {
        return fast;
    }

    let slow = brute_force_search(input, timeout);
    if slow.score > fast.score
        || (slow.score == fast.score && slow.tokens.len() < fast.tokens.len())
    {
        slow
    } else {
        fast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn two_flag_input(expected: [bool; 4]) -> SearchInput {
        let assignments = [
            assignment(&[("A", "On"), ("B", "Enabled")]),
            assignment(&[("A", "On"), ("B", "Disabled")]),
            assignment(&[("A", "Off"), ("B", "Enabled")]),
            assignment(&[("A", "Off"), ("B", "Disabled")]),
        ];
        let definition = FlagDefinition::from_assignments(assignments.iter());
        SearchInput {
            cases: expected.into_iter().zip(assignments).collect(),
            definition,
        }
    }

    #[test]
    fn flag_definition_bias_and_pruning() {
        let assignments = [
            assignment(&[("A", "Off"), ("Same", "x"), ("B", "Custom")]),
            assignment(&[("A", "On"), ("Same", "x"), ("B", "Disabled")]),
        ];
        let definition = FlagDefinition::from_assignments(assignments.iter());
        assert_eq!(
            vec![
                ("A".to_string(), vec!["On".to_string(), "Off".to_string()]),
                (
                    "B".to_string(),
                    vec!["Custom".to_string(), "Disabled".to_string()]
                ),
            ],
            definition.flags
        );
    }

    #[test]
    fn evaluation_short_circuits_right_to_left() {
        let definition = FlagDefinition {
            flags: vec![
                ("A".to_string(), vec!["On".to_string(), "Off".to_string()]),
                ("B".to_string(), vec!["On".to_string(), "Off".to_string()]),
            ],
        };
        // A & B | ~B, right to left: ~B wins when B=Off.
        let tokens = [
            SearchToken {
                join: JoinKind::Initial,
                negative: false,
                flag: 0,
                value: 0,
            },
            SearchToken {
                join: JoinKind::And,
                negative: false,
                flag: 1,
                value: 0,
            },
            SearchToken {
                join: JoinKind::Or,
                negative: true,
                flag: 1,
                value: 0,
            },
        ];
        assert!(evaluate(
            &tokens,
            &assignment(&[("A", "Off"), ("B", "Off")]),
            &definition
        ));
        assert!(evaluate(
            &tokens,
            &assignment(&[("A", "On"), ("B", "On")]),
            &definition
        ));
        assert!(!evaluate(
            &tokens,
            &assignment(&[("A", "Off"), ("B", "On")]),
            &definition
        ));
    }

    #[test]
    fn greedy_finds_single_flag() {
        let input = two_flag_input([true, true, false, false]);
        let result = search(&input, Duration::from_millis(100));
        assert!(result.is_perfect());
        assert_eq!(1, result.tokens.len());
        let token = result.tokens[0];
        assert_eq!((0, 0), (token.flag, token.value));
        assert!(!token.negative);
    }

    #[test]
    fn conjunction_is_found() {
        let input = two_flag_input([true, false, false, false]);
        let result = search(&input, Duration::from_millis(500));
        assert!(result.is_perfect());
        for (expected, assignment) in &input.cases {
            assert_eq!(
                *expected,
                evaluate(&result.tokens, assignment, &input.definition)
            );
        }
    }

    #[test]
    fn xor_is_approximated() {
        // Each token only ands or ors one literal onto the whole chain, so
        // A != B has no exact rendering and the best cover is 3 of 4.
        let input = two_flag_input([false, true, true, false]);
        let result = search(&input, Duration::from_secs(2));
        assert!(!result.is_perfect());
        assert_eq!(3, result.score);
        assert_eq!(4, result.total);
    }

    #[test]
    fn determinism() {
        let input = two_flag_input([true, false, true, false]);
        let first = search(&input, Duration::from_millis(200));
        let second = search(&input, Duration::from_millis(200));
        assert_eq!(first, second);
    }
}
