//! Boolean minimization for synthesized preprocessor conditions.
//!
//! Inputs use the convention that variable 0 is the most significant bit of
//! a minterm index, so for variables `[A, B]` the assignment `A=1, B=0` is
//! minterm `0b10`.
use std::collections::BTreeSet;

/// One product term of a simplified expression.
/// `positive` is false for literals negated with `~`.
pub(crate) type Product = Vec<(String, bool)>;

/// A sum-of-products expression over named variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplifiedExpression {
    /// Rendered form using `&`, `|` and `~`, or the constants
    /// `"True"` and `"False"`.
    pub expression: String,
    /// Every variable name referenced by [expression](Self::expression).
    pub atoms: BTreeSet<String>,
    pub(crate) products: Vec<Product>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Implicant {
    mask: u32,
    value: u32,
    covered: BTreeSet<u32>,
}

impl Implicant {
    fn matches(&self, minterm: u32) -> bool {
        minterm & self.mask == self.value
    }
}

/// Returns a minimal-ish sum of products covering exactly `minterms`.
///
/// Prime implicants come from Quine–McCluskey pairing; the cover picks
/// essential implicants first and fills the rest greedily by uncovered
/// count, breaking ties in first-seen order.
pub fn simplify(variables: &[String], minterms: &[u32]) -> SimplifiedExpression {
    let bit_count = variables.len() as u32;
    let total = 1u64 << bit_count;

    let mut seen = BTreeSet::new();
    let unique: Vec<u32> = minterms
        .iter()
        .copied()
        .filter(|m| seen.insert(*m))
        .collect();

    if unique.is_empty() {
        return SimplifiedExpression {
            expression: "False".to_string(),
            atoms: BTreeSet::new(),
            products: Vec::new(),
        };
    }
    if unique.len() as u64 == total {
        return SimplifiedExpression {
            expression: "True".to_string(),
            atoms: BTreeSet::new(),
            products: Vec::new(),
        };
    }

    let primes = prime_implicants(bit_count, &unique);
    let cover = select_cover(&primes, &unique);
    format_cover(variables, &cover)
}

fn prime_implicants(bit_count: u32, minterms: &[u32]) -> Vec<Implicant> {
    let all_ones = if bit_count == 0 {
        0
    } else {
        (1u64 << bit_count) as u32 - 1
    };

    let mut generation: Vec<Implicant> = minterms
        .iter()
        .map(|m| Implicant {
            mask: all_ones,
            value: *m,
            covered: BTreeSet::from([*m]),
        })
        .collect();

    let mut primes = Vec::new();
    while !generation.is_empty() {
        let mut used = vec![false; generation.len()];
        let mut next = Vec::<Implicant>::new();

        for i in 0..generation.len() {
            for j in i + 1..generation.len() {
                let (a, b) = (&generation[i], &generation[j]);
                if a.mask != b.mask {
                    continue;
                }
                let difference = a.value ^ b.value;
                if difference.count_ones() != 1 || difference & a.mask == 0 {
                    continue;
                }

                used[i] = true;
                used[j] = true;
                let combined = Implicant {
                    mask: a.mask & !difference,
                    value: a.value & !difference,
                    covered: a.covered.union(&b.covered).copied().collect(),
                };
                if !next
                    .iter()
                    .any(|n| n.mask == combined.mask && n.value == combined.value)
                {
                    next.push(combined);
                }
            }
        }

        for (implicant, used) in generation.into_iter().zip(used) {
            if !used && !primes.contains(&implicant) {
                primes.push(implicant);
            }
        }
        generation = next;
    }
    primes
}

fn select_cover(primes: &[Implicant], minterms: &[u32]) -> Vec<Implicant> {
    let mut selected: Vec<usize> = Vec::new();
    let mut uncovered: BTreeSet<u32> = minterms.iter().copied().collect();

    // Essential primes are the sole cover of at least one minterm.
    for minterm in minterms {
        let covering: Vec<usize> = primes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.matches(*minterm))
            .map(|(index, _)| index)
            .collect();
        if let [only] = covering[..] {
            if !selected.contains(&only) {
                selected.push(only);
                for m in &primes[only].covered {
                    uncovered.remove(m);
                }
            }
        }
    }

    while !uncovered.is_empty() {
        // First-seen order wins ties, so only strict improvements replace.
        let mut best: Option<(usize, usize)> = None;
        for (index, prime) in primes.iter().enumerate() {
            let count = prime
                .covered
                .iter()
                .filter(|m| uncovered.contains(m))
                .count();
            if count > 0 && best.map_or(true, |(_, c)| count > c) {
                best = Some((index, count));
            }
        }
        let Some((index, _)) = best else {
            break;
        };
        selected.push(index);
        for m in &primes[index].covered {
            uncovered.remove(m);
        }
    }

    selected.into_iter().map(|index| primes[index].clone()).collect()
}

fn format_cover(variables: &[String], cover: &[Implicant]) -> SimplifiedExpression {
    let bit_count = variables.len();

    let products: Vec<Product> = cover
        .iter()
        .map(|implicant| {
            variables
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    let bit = 1u32 << (bit_count - 1 - i);
                    (implicant.mask & bit != 0)
                        .then(|| (name.clone(), implicant.value & bit != 0))
                })
                .collect()
        })
        .collect();

    let atoms = products
        .iter()
        .flatten()
        .map(|(name, _)| name.clone())
        .collect();

    let multiple = products.len() > 1;
    let expression = products
        .iter()
        .map(|product| {
            let rendered = product
                .iter()
                .map(|(name, positive)| {
                    if *positive {
                        name.clone()
                    } else {
                        format!("~{name}")
                    }
                })
                .collect::<Vec<_>>()
                .join(" & ");
            if multiple && product.len() > 1 {
                format!("({rendered})")
            } else {
                rendered
            }
        })
        .collect::<Vec<_>>()
        .join(" | ");

    SimplifiedExpression {
        expression,
        atoms,
        products,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn eval(products: &[Product], variables: &[String], assignment: u32) -> bool {
        let bit_count = variables.len();
        products.iter().any(|product| {
            product.iter().all(|(name, positive)| {
                let index = variables.iter().position(|v| v == name).unwrap();
                let bit = assignment & (1 << (bit_count - 1 - index)) != 0;
                bit == *positive
            })
        })
    }

    #[test]
    fn constants() {
        assert_eq!("False", simplify(&vars(&["A", "B"]), &[]).expression);
        assert_eq!(
            "True",
            simplify(&vars(&["A", "B"]), &[0, 1, 2, 3]).expression
        );
    }

    #[test]
    fn single_variable_survives() {
        // 011, 010, 110, 111 reduce to just B.
        let result = simplify(&vars(&["A", "B", "C"]), &[0b011, 0b010, 0b110, 0b111]);
        assert_eq!("B", result.expression);
        assert_eq!(BTreeSet::from(["B".to_string()]), result.atoms);
    }

    #[test]
    fn negated_literal() {
        let result = simplify(&vars(&["A"]), &[0]);
        assert_eq!("~A", result.expression);
    }

    #[test]
    fn exact_cover_law() {
        let variables = vars(&["A", "B", "C", "D"]);
        let cases: &[&[u32]] = &[
            &[0],
            &[1, 3, 5, 7, 9, 11, 13, 15],
            &[0, 2, 4, 6, 8],
            &[4, 8, 10, 11, 12, 15],
            &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14],
        ];
        for minterms in cases {
            let result = simplify(&variables, minterms);
            for assignment in 0..16u32 {
                assert_eq!(
                    minterms.contains(&assignment),
                    eval(&result.products, &variables, assignment),
                    "assignment {assignment:04b} of {minterms:?}"
                );
            }
        }
    }

    #[test]
    fn multi_literal_products_parenthesize() {
        // 00 and 11 cannot combine, leaving two two-literal products.
        let result = simplify(&vars(&["A", "B"]), &[0b00, 0b11]);
        assert_eq!("(~A & ~B) | (A & B)", result.expression);
    }

    #[test]
    fn duplicate_minterms_are_ignored() {
        let result = simplify(&vars(&["A", "B"]), &[1, 1, 3, 3]);
        assert_eq!("B", result.expression);
    }
}
