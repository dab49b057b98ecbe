//! Text normalization applied to compiled GLSL before diffing.
//!
//! The compiled output carries bgfx-generated scaffolding (uniform
//! redeclarations, directives, expanded sampler declarations) that the
//! original hand-written source never contained. These rewrites fold that
//! scaffolding back into the `$input`/`$output` and `*_AUTOREG` macro
//! forms so reconstructed sources resemble what the authors wrote.
use std::sync::LazyLock;

use regex::Regex;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[^\n]*").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\n").expect("valid regex"));

/// Strips `//` and `/* */` comments and drops blank lines.
pub fn strip_comments(code: &str) -> String {
    let code = BLOCK_COMMENT.replace_all(code, "");
    let code = LINE_COMMENT.replace_all(&code, "");
    BLANK_LINES.replace_all(&code, "").into_owned()
}

static VERTEX_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#define varying out$").expect("valid regex"));

static UNIFORM_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*uniform[ \t]+\w+[ \t]+u_\w+(?:[ \t]*\[[ \t]*\d+[ \t]*\])?[ \t]*;[ \t]*\n?")
        .expect("valid regex")
});
static OUT_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*out[ \t]+[^;\n]*;[ \t]*\n?").expect("valid regex"));
static DEFINE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#define[^\n]*\n?").expect("valid regex"));
// One-line #if ... #endif first, so the block pattern never pairs an
// opening directive with a later block's #endif.
static IF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*#if[^\n]*?#endif[^\n]*\n?").expect("valid regex")
});
static IF_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*#if[^\n]*$.*?^[ \t]*#endif[^\n]*\n?").expect("valid regex")
});
static EXTENSION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#extension[^\n]*\n?").expect("valid regex"));
static VERSION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#version[^\n]*\n?").expect("valid regex"));

static ATTRIBUTE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*attribute[ \t]+(?:[\w]+[ \t]+)*([\w]+)[ \t]*;").expect("valid regex")
});
static VARYING_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:centroid[ \t]+)?varying[ \t]+(?:[\w]+[ \t]+)*([\w]+)[ \t]*;")
        .expect("valid regex")
});

/// GLSL sampler type to its declaration macro.
const SAMPLER_MACROS: [(&str, &str); 14] = [
    ("sampler2DArrayShadow", "SAMPLER2DARRAYSHADOW"),
    ("sampler2DArray", "SAMPLER2DARRAY"),
    ("sampler2DShadow", "SAMPLER2DSHADOW"),
    ("sampler2D", "SAMPLER2D"),
    ("sampler3D", "SAMPLER3D"),
    ("samplerCubeShadow", "SAMPLERCUBESHADOW"),
    ("samplerCubeArray", "SAMPLERCUBEARRAY"),
    ("samplerCube", "SAMPLERCUBE"),
    ("isampler2DArray", "ISAMPLER2DARRAY"),
    ("isampler2D", "ISAMPLER2D"),
    ("isampler3D", "ISAMPLER3D"),
    ("usampler2DArray", "USAMPLER2DARRAY"),
    ("usampler2D", "USAMPLER2D"),
    ("usampler3D", "USAMPLER3D"),
];

static SAMPLER_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*uniform[ \t]+(?:highp[ \t]+|mediump[ \t]+|lowp[ \t]+)?([iu]?sampler\w+)[ \t]+(\w+)[ \t]*;",
    )
    .expect("valid regex")
});

static STORAGE_BUFFER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ms)^[ \t]*layout[ \t]*\([ \t]*std430[^)]*\)[ \t]*(readonly|writeonly)?[ \t]*buffer[ \t]+(\w+)[ \t\n]*\{[ \t\n]*(\w+)[^}]*\}[ \t]*;?[ \t]*\n?",
    )
    .expect("valid regex")
});

static IMAGE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*layout[ \t]*\([ \t]*(\w+)[^)]*\)[ \t]*(readonly[ \t]+|writeonly[ \t]+)?uniform[ \t]+(?:highp[ \t]+)?(u?)image(2DArray|2D|3D)[ \t]+(\w+)[ \t]*;",
    )
    .expect("valid regex")
});

static LOCAL_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*layout[ \t]*\([ \t]*local_size_x[ \t]*=[ \t]*(\d+)[ \t]*,[ \t]*local_size_y[ \t]*=[ \t]*(\d+)[ \t]*,[ \t]*local_size_z[ \t]*=[ \t]*(\d+)[ \t]*\)[ \t]*in[ \t]*;",
    )
    .expect("valid regex")
});

fn access_suffix(qualifier: Option<&str>) -> &'static str {
    match qualifier.map(str::trim) {
        Some("readonly") => "RO",
        Some("writeonly") => "WR",
        _ => "RW",
    }
}

/// Rewrites one compiled GLSL variant back towards authored form.
/// The stage is detected from the `#define varying out` marker before any
/// directives are stripped.
pub fn apply_bgfx_rewrites(code: &str) -> String {
    let is_vertex = VERTEX_MARKER.is_match(code);

    let code = UNIFORM_DECL.replace_all(code, "");
    let code = code
        .replace("bgfx_FragColor", "gl_FragColor")
        .replace("bgfx_FragData", "gl_FragData");
    let code = OUT_DECL.replace_all(&code, "");
    let code = DEFINE_LINE.replace_all(&code, "");
    let code = IF_LINE.replace_all(&code, "");
    let code = IF_BLOCK.replace_all(&code, "");
    let code = EXTENSION_LINE.replace_all(&code, "");
    let code = VERSION_LINE.replace_all(&code, "");

    let code = ATTRIBUTE_DECL.replace_all(&code, "$$input ${1}");
    let varying_directive = if is_vertex { "$$output ${1}" } else { "$$input ${1}" };
    let code = VARYING_DECL.replace_all(&code, varying_directive);

    let mut code = code.into_owned();
    code = SAMPLER_DECL
        .replace_all(&code, |captures: &regex::Captures| {
            let sampler_type = &captures[1];
            let name = &captures[2];
            match SAMPLER_MACROS.iter().find(|(t, _)| *t == sampler_type) {
                Some((_, macro_name)) => format!("{macro_name}_AUTOREG({name});"),
                None => captures[0].to_string(),
            }
        })
        .into_owned();

    code = STORAGE_BUFFER
        .replace_all(&code, |captures: &regex::Captures| {
            let access = access_suffix(captures.get(1).map(|m| m.as_str()));
            let name = &captures[2];
            let element_type = &captures[3];
            format!("BUFFER_{access}_AUTOREG({name}, {element_type});\n")
        })
        .into_owned();

    code = IMAGE_DECL
        .replace_all(&code, |captures: &regex::Captures| {
            let format = &captures[1];
            let access = access_suffix(captures.get(2).map(|m| m.as_str()));
            let unsigned = if &captures[3] == "u" { "U" } else { "" };
            let kind = match &captures[4] {
                "2DArray" => "2D_ARRAY",
                "3D" => "3D",
                _ => "2D",
            };
            let name = &captures[5];
            format!("{unsigned}IMAGE{kind}_{access}_AUTOREG({name}, {format});")
        })
        .into_owned();

    code = LOCAL_SIZE
        .replace_all(&code, "NUM_THREADS(${1}, ${2}, ${3})")
        .into_owned();

    code
}
