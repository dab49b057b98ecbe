//! Reconstructing one conditional source file from compiled variants.
//!
//! Every variant of a pass was preprocessed from the same source under a
//! different flag combination. Lines are merged across variants with their
//! conditions tracked, and each condition that does not cover every
//! variant is turned back into a preprocessor conditional over synthesized
//! macro names.
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use regex::Regex;

use crate::diff::{group_lines, merge_permutations, CodeLineGroup};
use crate::minimize::{simplify, SimplifiedExpression};
use crate::preprocess::{apply_bgfx_rewrites, strip_comments};
use crate::search::{search, FlagDefinition, JoinKind, SearchInput, SearchResult};
use crate::DecompileError;

/// One compiled variant body and the flags that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputVariant {
    pub code: String,
    pub flags: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DecompileOptions {
    /// Strip comments and apply the bgfx rewrites before diffing.
    pub preprocess: bool,
    /// Merge `$input`/`$output` runs and mark fragile lines afterwards.
    pub postprocess: bool,
    /// Wall-clock budget for each brute-force expression search.
    pub search_timeout: Duration,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            preprocess: true,
            postprocess: true,
            search_timeout: Duration::from_secs(10),
        }
    }
}

/// A reconstructed source and the macro names its conditionals reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompiledShader {
    pub code: String,
    pub used_macros: BTreeSet<String>,
}

static FUNCTION_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*?([^#\s][\w]+)\s+([\w]+)\s*\(([^;]*?)\)\s*\{").expect("valid regex")
});
static STRUCT_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^\s*?struct\s+([\w]+)\s*\{(.*?)\};").expect("valid regex"));
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"START_NAME\|\|\|(.*?)\|\|\|END_NAME").expect("valid regex"));

#[derive(Debug, Clone)]
struct ExtractedBlock {
    signature: String,
    body: String,
    is_struct: bool,
}

fn find_matching_brace(text: &str, open: usize) -> Result<usize, DecompileError> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for (offset, byte) in bytes[open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(open + offset);
                }
            }
            _ => {}
        }
    }
    Err(DecompileError::UnbalancedBraces(
        text[open..].chars().take(40).collect(),
    ))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replaces function and struct definitions with placeholder lines and
/// returns the extracted blocks in source order.
fn extract_blocks(code: &str) -> Result<(String, Vec<ExtractedBlock>), DecompileError> {
    let mut text = code.to_string();
    let mut blocks = Vec::new();

    while let Some(captures) = FUNCTION_DEF.captures(&text) {
        let whole = captures.get(0).expect("group 0 always present");
        let open = whole.end() - 1;
        let close = find_matching_brace(&text, open)?;

        let signature = format!(
            "{} {}({})",
            &captures[1],
            &captures[2],
            collapse_whitespace(&captures[3])
        );
        let body = text[open + 1..close].trim_matches('\n').to_string();
        blocks.push(ExtractedBlock {
            signature: signature.clone(),
            body,
            is_struct: false,
        });

        let mut end = close + 1;
        if text.as_bytes().get(end) == Some(&b'\n') {
            end += 1;
        }
        let start = whole.start();
        text.replace_range(start..end, &format!("START_NAME|||{signature}|||END_NAME\n"));
    }

    while let Some(captures) = STRUCT_DEF.captures(&text) {
        let whole = captures.get(0).expect("group 0 always present");
        let signature = format!("struct {}", &captures[1]);
        let body = captures[2].trim_matches('\n').to_string();
        blocks.push(ExtractedBlock {
            signature: signature.clone(),
            body,
            is_struct: true,
        });

        let mut end = whole.end();
        if text.as_bytes().get(end) == Some(&b'\n') {
            end += 1;
        }
        let start = whole.start();
        text.replace_range(start..end, &format!("START_NAME|||{signature}|||END_NAME\n"));
    }

    Ok((text, blocks))
}

/// Interns every distinct source line.
#[derive(Debug, Default)]
struct LineTable {
    lines: IndexSet<String>,
}

impl LineTable {
    fn encode(&mut self, code: &str) -> Vec<u32> {
        code.lines()
            .map(|line| self.lines.insert_full(line.to_string()).0 as u32)
            .collect()
    }

    fn decode(&self, index: u32) -> &str {
        self.lines
            .get_index(index as usize)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Byte-identical bodies merged across the flag sets that produced them.
#[derive(Debug, Clone)]
struct Permutation {
    lines: Vec<u32>,
    flag_sets: Vec<IndexMap<String, String>>,
}

/// One diffing scope: the main text, or one extracted function or struct.
#[derive(Debug, Clone, Default)]
struct Context {
    permutations: Vec<Permutation>,
}

impl Context {
    fn push(&mut self, lines: Vec<u32>, flags: IndexMap<String, String>) {
        match self.permutations.iter_mut().find(|p| p.lines == lines) {
            Some(existing) => existing.flag_sets.push(flags),
            None => self.permutations.push(Permutation {
                lines,
                flag_sets: vec![flags],
            }),
        }
    }
}

/// Maps a flag assignment to the preprocessor macro standing in for it,
/// plus whether definedness is inverted (boolean off-values).
pub(crate) fn macro_for(name: &str, value: &str) -> (String, bool) {
    const TRUE_VALUES: [&str; 2] = ["On", "True"];
    const FALSE_VALUES: [&str; 2] = ["Off", "False"];

    if name == "pass" {
        let mut macro_name = upper_snake(value);
        if !macro_name.ends_with("_PASS") {
            macro_name.push_str("_PASS");
        }
        (macro_name, false)
    } else if let Some(stripped) = name.strip_prefix("f_") {
        if TRUE_VALUES.contains(&value) {
            (upper_snake(stripped), false)
        } else if FALSE_VALUES.contains(&value) {
            (upper_snake(stripped), true)
        } else {
            (upper_snake(&format!("{stripped}__{value}")), false)
        }
    } else if TRUE_VALUES.contains(&value) {
        (upper_snake(name), false)
    } else if FALSE_VALUES.contains(&value) {
        (upper_snake(name), true)
    } else {
        (upper_snake(&format!("{name}{value}")), false)
    }
}

pub(crate) fn upper_snake(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        let boundary = c.is_ascii_uppercase()
            && i > 0
            && (chars[i - 1].is_ascii_lowercase()
                || chars[i - 1].is_ascii_digit()
                || matches!(chars.get(i + 1), Some(next) if next.is_ascii_lowercase()));
        if boundary && !out.ends_with('_') {
            out.push('_');
        }
        if c.is_ascii_alphanumeric() || *c == '_' {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    out
}

/// A rendered conditional: the opening directive (if any) and the macros
/// it references.
#[derive(Debug, Clone)]
struct Conditional {
    directive: Option<String>,
    macros: BTreeSet<String>,
    score: usize,
    total: usize,
}

/// Converts a token sequence into a preprocessor directive by building its
/// truth table over synthesized macros and minimizing.
fn synthesize_conditional(
    result: &SearchResult,
    definition: &FlagDefinition,
) -> Conditional {
    // Distinct macros in first-appearance order become the variables.
    let mut variables: Vec<String> = Vec::new();
    let mut token_macros: Vec<(usize, bool)> = Vec::new();
    for token in &result.tokens {
        let (name, values) = &definition.flags[token.flag];
        let (macro_name, inverted) = macro_for(name, &values[token.value]);
        let index = match variables.iter().position(|v| *v == macro_name) {
            Some(index) => index,
            None => {
                variables.push(macro_name);
                variables.len() - 1
            }
        };
        token_macros.push((index, inverted));
    }

    let bit_count = variables.len();
    let mut minterms = Vec::new();
    for assignment in 0..(1u32 << bit_count) {
        let defined =
            |index: usize| assignment & (1 << (bit_count - 1 - index)) != 0;
        let mut value = false;
        for (token, (macro_index, inverted)) in
            result.tokens.iter().zip(&token_macros).rev()
        {
            let truth = (defined(*macro_index) != *inverted) != token.negative;
            match token.join {
                JoinKind::And if !truth => {
                    value = false;
                    break;
                }
                JoinKind::Or if truth => {
                    value = true;
                    break;
                }
                JoinKind::Initial => {
                    value = truth;
                    break;
                }
                _ => {}
            }
        }
        if value {
            minterms.push(assignment);
        }
    }

    let simplified = simplify(&variables, &minterms);
    let macros = simplified.atoms.clone();
    Conditional {
        directive: format_directive(&simplified),
        macros,
        score: result.score,
        total: result.total,
    }
}

/// `None` means the group is unconditional.
fn format_directive(simplified: &SimplifiedExpression) -> Option<String> {
    if simplified.expression == "True" {
        return None;
    }
    if simplified.expression == "False" {
        return Some("#if 0".to_string());
    }

    if let [product] = &simplified.products[..] {
        if let [(name, positive)] = &product[..] {
            return Some(if *positive {
                format!("#ifdef {name}")
            } else {
                format!("#ifndef {name}")
            });
        }
    }

    let multiple = simplified.products.len() > 1;
    let rendered = simplified
        .products
        .iter()
        .map(|product| {
            let term = product
                .iter()
                .map(|(name, positive)| {
                    if *positive {
                        format!("defined({name})")
                    } else {
                        format!("!defined({name})")
                    }
                })
                .collect::<Vec<_>>()
                .join(" && ");
            if multiple && product.len() > 1 {
                format!("({term})")
            } else {
                term
            }
        })
        .collect::<Vec<_>>()
        .join(" || ");
    Some(format!("#if {rendered}"))
}

/// The merged and searched form of one context, ready for assembly.
struct ResolvedContext {
    groups: Vec<CodeLineGroup>,
    group_conditionals: Vec<Option<usize>>,
    conditionals: Vec<Conditional>,
}

fn resolve_context(
    context: &Context,
    timeout: Duration,
) -> Result<ResolvedContext, DecompileError> {
    let bodies: Vec<Vec<u32>> = context.permutations.iter().map(|p| p.lines.clone()).collect();
    let merged = merge_permutations(&bodies)?;
    let groups = group_lines(merged);

    let definition =
        FlagDefinition::from_assignments(context.permutations.iter().flat_map(|p| p.flag_sets.iter()));

    // (permutation index, assignment) pairs form the case universe.
    let cases: Vec<(usize, &IndexMap<String, String>)> = context
        .permutations
        .iter()
        .enumerate()
        .flat_map(|(index, p)| p.flag_sets.iter().map(move |flags| (index, flags)))
        .collect();

    let mut inputs: Vec<SearchInput> = Vec::new();
    let mut input_by_expected: HashMap<Vec<bool>, usize> = HashMap::new();
    let mut group_conditionals = Vec::with_capacity(groups.len());

    for group in &groups {
        if group.condition.len() >= context.permutations.len() {
            group_conditionals.push(None);
            continue;
        }
        let expected: Vec<bool> = cases
            .iter()
            .map(|(perm, _)| group.condition.contains(perm))
            .collect();
        let index = *input_by_expected.entry(expected.clone()).or_insert_with(|| {
            inputs.push(SearchInput {
                cases: expected
                    .iter()
                    .zip(&cases)
                    .map(|(e, (_, flags))| (*e, (*flags).clone()))
                    .collect(),
                definition: definition.clone(),
            });
            inputs.len() - 1
        });
        group_conditionals.push(Some(index));
    }

    debug!(
        "{} line groups, {} deduplicated searches",
        groups.len(),
        inputs.len()
    );

    let conditionals = inputs
        .iter()
        .map(|input| synthesize_conditional(&search(input, timeout), &input.definition))
        .collect();

    Ok(ResolvedContext {
        groups,
        group_conditionals,
        conditionals,
    })
}

fn assemble_context(resolved: &ResolvedContext, table: &LineTable) -> String {
    let mut out = String::new();
    for (group, conditional_index) in resolved
        .groups
        .iter()
        .zip(&resolved.group_conditionals)
    {
        let lines = group
            .lines
            .iter()
            .map(|index| table.decode(*index))
            .collect::<Vec<_>>()
            .join("\n");

        match conditional_index.and_then(|i| {
            let c = &resolved.conditionals[i];
            c.directive.as_ref().map(|d| (d, c))
        }) {
            Some((directive, conditional)) => {
                if conditional.score < conditional.total {
                    out.push_str(&format!(
                        "// Approximation, matches {} cases out of {}\n",
                        conditional.score, conditional.total
                    ));
                }
                out.push_str(directive);
                out.push('\n');
                out.push_str(&lines);
                out.push_str("\n#endif\n");
            }
            None => {
                out.push_str(&lines);
                out.push('\n');
            }
        }
    }
    out
}

fn merge_io_directives(code: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut run: Option<(&'static str, Vec<String>)> = None;

    let flush = |run: &mut Option<(&'static str, Vec<String>)>, out: &mut Vec<String>| {
        if let Some((directive, names)) = run.take() {
            out.push(format!("{directive} {}", names.join(", ")));
        }
    };

    for line in code.lines() {
        let directive = ["$input", "$output"]
            .into_iter()
            .find(|d| line.trim_start().starts_with(&format!("{d} ")));
        match directive {
            Some(directive) => {
                let directive = if directive == "$input" { "$input" } else { "$output" };
                let names = line.trim_start()[directive.len()..]
                    .split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty());
                match &mut run {
                    Some((current, collected)) if *current == directive => {
                        collected.extend(names)
                    }
                    _ => {
                        flush(&mut run, &mut out);
                        run = Some((directive, names.collect()));
                    }
                }
            }
            None => {
                flush(&mut run, &mut out);
                out.push(line.to_string());
            }
        }
    }
    flush(&mut run, &mut out);

    let mut merged = out.join("\n");
    if code.ends_with('\n') {
        merged.push('\n');
    }
    merged
}

fn mark_fragile_lines(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.lines() {
        out.push_str(line);
        if (line.contains(") * (") || line.contains("][")) && !line.contains("// Attention!") {
            out.push_str(" // Attention!");
        }
        out.push('\n');
    }
    if !code.ends_with('\n') {
        out.pop();
    }
    out
}

/// Reconstructs one source file from compiled variants of it.
pub fn decompile(
    variants: &[InputVariant],
    options: &DecompileOptions,
) -> Result<DecompiledShader, DecompileError> {
    if variants.is_empty() {
        return Err(DecompileError::Empty);
    }

    let mut table = LineTable::default();
    let mut main_context = Context::default();
    // signature -> (context, is_struct)
    let mut block_contexts: IndexMap<String, (Context, bool)> = IndexMap::new();

    for variant in variants {
        let code = if options.preprocess {
            apply_bgfx_rewrites(&strip_comments(&variant.code))
        } else {
            variant.code.clone()
        };

        let (main_text, blocks) = extract_blocks(&code)?;
        main_context.push(table.encode(&main_text), variant.flags.clone());
        for block in blocks {
            let (context, _) = block_contexts
                .entry(block.signature.clone())
                .or_insert_with(|| (Context::default(), block.is_struct));
            context.push(table.encode(&block.body), variant.flags.clone());
        }
    }

    let resolved_main = resolve_context(&main_context, options.search_timeout)?;
    let mut used_macros: BTreeSet<String> = resolved_main
        .conditionals
        .iter()
        .flat_map(|c| c.macros.iter().cloned())
        .collect();

    let mut assembled_blocks: IndexMap<String, String> = IndexMap::new();
    for (signature, (context, is_struct)) in &block_contexts {
        let resolved = resolve_context(context, options.search_timeout)?;
        used_macros.extend(
            resolved
                .conditionals
                .iter()
                .flat_map(|c| c.macros.iter().cloned()),
        );
        let body = assemble_context(&resolved, &table);
        let close = if *is_struct { "};" } else { "}" };
        assembled_blocks.insert(
            signature.clone(),
            format!("{signature} {{\n{}{close}", body),
        );
    }

    let mut code = assemble_context(&resolved_main, &table);
    code = PLACEHOLDER
        .replace_all(&code, |captures: &regex::Captures| {
            assembled_blocks
                .get(&captures[1])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned();

    if options.postprocess {
        code = merge_io_directives(&code);
        code = mark_fragile_lines(&code);
    }

    Ok(DecompiledShader { code, used_macros })
}
