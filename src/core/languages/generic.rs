use regex::Regex;

use crate::core::call_graph::{CallLinks, CallResolver, CallSyntax, FunctionRecord, WORD_CHARS};
use crate::error::Result;
use super::lexer::{split_params, strip_comments, CommentSyntax, C_STYLE, C_STYLE_QUOTES};
use super::scanner::FunctionScanner;
use super::{
    ImportRule, LanguageAdapter, ParserContext, SourceUnit, C_INCLUDE, CIRCOM_INCLUDE, MOD_DECLARATION,
    QUOTED_IMPORT,
};

/// Table entry for a language handled by the generic function scanner
pub struct GenericSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    /// Regex fragment matching the declaration keyword
    pub keyword: &'static str,
    pub identifier: &'static str,
    /// Identifier characters, as the body of a regex character class
    pub ident_chars: &'static str,
    pub comments: CommentSyntax,
    /// `(pattern, tag)` pairs tried in order against the declaration text;
    /// the first match wins and `regular` is the fallback
    pub classifications: &'static [(&'static str, &'static str)],
    pub imports: &'static [ImportRule],
}

const IDENT: &str = r"[A-Za-z_]\w*";
const JS_IDENT: &str = r"[A-Za-z_$][\w$]*";
const JS_CHARS: &str = "A-Za-z0-9_$";

pub const GENERIC_LANGUAGES: &[GenericSpec] = &[
    GenericSpec {
        id: "tolk",
        name: "Tolk",
        extensions: &["tolk"],
        keyword: "fun",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[
            (r"\bfun\s+(?:onInternalMessage|onExternalMessage|onBouncedMessage|main)\s*\(", "entry"),
            (r"@pure\b", "pure"),
            (r"\bget\s+fun\b|@method_id", "get"),
            (r"@inline", "inline"),
        ],
        imports: &[QUOTED_IMPORT],
    },
    GenericSpec {
        id: "huff",
        name: "Huff",
        extensions: &["huff"],
        keyword: r"#define\s+(?:macro|fn|test)",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[
            (r"#define\s+\w+\s+(?:MAIN|CONSTRUCTOR)\s*\(", "entry"),
            (r"#define\s+test\b", "test"),
            (r"#define\s+macro\b", "inline"),
        ],
        imports: &[C_INCLUDE],
    },
    GenericSpec {
        id: "sway",
        name: "Sway",
        extensions: &["sw"],
        keyword: "fn",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\bfn\s+main\s*\(", "entry"), (r"\bpub\s+fn\b", "public")],
        imports: &[MOD_DECLARATION],
    },
    GenericSpec {
        id: "fe",
        name: "Fe",
        extensions: &["fe"],
        keyword: "fn",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\bfn\s+__init__\s*\(", "entry"), (r"\bpub\s+fn\b", "public")],
        imports: &[],
    },
    GenericSpec {
        id: "noir",
        name: "Noir",
        extensions: &["nr"],
        keyword: "fn",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\bfn\s+main\s*\(", "entry"), (r"\bpub(?:\([^)]*\))?\s+", "public")],
        imports: &[MOD_DECLARATION],
    },
    GenericSpec {
        id: "leo",
        name: "Leo",
        extensions: &["leo"],
        keyword: "transition|function|inline",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\btransition\b", "entry"), (r"\binline\b", "inline")],
        imports: &[],
    },
    GenericSpec {
        id: "yul",
        name: "Yul",
        extensions: &["yul"],
        keyword: "function",
        identifier: r"[A-Za-z_$][\w$.]*",
        ident_chars: "A-Za-z0-9_$.",
        comments: C_STYLE,
        classifications: &[],
        imports: &[],
    },
    GenericSpec {
        id: "cadence",
        name: "Cadence",
        extensions: &["cdc"],
        keyword: "fun",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\bview\s+fun\b", "view"), (r"\bpub\b|access\(\s*all\s*\)", "public")],
        imports: &[],
    },
    GenericSpec {
        id: "motoko",
        name: "Motoko",
        extensions: &["mo"],
        keyword: "func",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\bquery\s+func\b", "get"), (r"\bpublic\b", "public")],
        imports: &[],
    },
    GenericSpec {
        id: "aiken",
        name: "Aiken",
        extensions: &["ak"],
        keyword: "fn",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\bpub\s+fn\b", "public")],
        imports: &[],
    },
    GenericSpec {
        id: "compact",
        name: "Compact",
        extensions: &["compact"],
        keyword: "circuit",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\bexport\b", "entry"), (r"\bpure\b", "pure")],
        imports: &[],
    },
    GenericSpec {
        id: "circom",
        name: "Circom",
        extensions: &["circom"],
        keyword: "template|function",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\btemplate\b", "template")],
        imports: &[CIRCOM_INCLUDE],
    },
    GenericSpec {
        id: "go",
        name: "Go",
        extensions: &["go"],
        keyword: r"func(?:\s*\([^)]*\))?",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE_QUOTES,
        classifications: &[(r"\bfunc(?:\s*\([^)]*\))?\s+[A-Z]", "public")],
        imports: &[],
    },
    GenericSpec {
        id: "typescript",
        name: "TypeScript",
        extensions: &["ts"],
        keyword: r"function\*?",
        identifier: JS_IDENT,
        ident_chars: JS_CHARS,
        comments: C_STYLE_QUOTES,
        classifications: &[(r"\bexport\b", "public")],
        imports: &[],
    },
    GenericSpec {
        id: "javascript",
        name: "JavaScript",
        extensions: &["js", "mjs"],
        keyword: r"function\*?",
        identifier: JS_IDENT,
        ident_chars: JS_CHARS,
        comments: C_STYLE_QUOTES,
        classifications: &[(r"\bexport\b", "public")],
        imports: &[],
    },
    GenericSpec {
        id: "jsligo",
        name: "JsLIGO",
        extensions: &["jsligo"],
        keyword: "function",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"@entry", "entry")],
        imports: &[],
    },
    GenericSpec {
        id: "rell",
        name: "Rell",
        extensions: &["rell"],
        keyword: "function|operation|query",
        identifier: IDENT,
        ident_chars: WORD_CHARS,
        comments: C_STYLE,
        classifications: &[(r"\boperation\b", "entry"), (r"\bquery\b", "get")],
        imports: &[],
    },
];

/// Adapter for any language described by a `GenericSpec`
pub struct GenericAdapter {
    spec: &'static GenericSpec,
    scanner: FunctionScanner,
    classifications: Vec<(Regex, &'static str)>,
    resolver: CallResolver,
}

impl GenericAdapter {
    pub fn new(spec: &'static GenericSpec) -> Result<Self> {
        let classifications = spec
            .classifications
            .iter()
            .map(|(pattern, tag)| Ok((Regex::new(pattern)?, *tag)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            spec,
            scanner: FunctionScanner::new(spec.keyword, spec.identifier)?,
            classifications,
            resolver: CallResolver::new(CallSyntax::Parenthesized, spec.ident_chars, spec.comments.line),
        })
    }

    fn classify(&self, declaration: &str) -> &'static str {
        self.classifications
            .iter()
            .find(|(pattern, _)| pattern.is_match(declaration))
            .map(|(_, tag)| *tag)
            .unwrap_or("regular")
    }
}

impl LanguageAdapter for GenericAdapter {
    fn language_id(&self) -> &'static str {
        self.spec.id
    }

    fn language_name(&self) -> &'static str {
        self.spec.name
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        self.spec.extensions
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let functions = self
            .scanner
            .scan(source)
            .into_iter()
            .map(|found| {
                FunctionRecord::new(found.name, found.name)
                    .with_parameters(split_params(found.params))
                    .with_body(found.body)
                    .with_classification(self.classify(found.declaration))
            })
            .collect();
        Ok(SourceUnit::with_functions(functions))
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        // Bodies come from the unstripped scan; blank out comments before matching
        let functions: Vec<FunctionRecord> = unit
            .functions
            .iter()
            .map(|f| {
                let mut f = f.clone();
                f.body_text = strip_comments(&f.body_text, &self.spec.comments);
                f
            })
            .collect();
        CallLinks {
            edges: self.resolver.resolve(&functions),
            external: Vec::new(),
        }
    }

    fn import_rules(&self) -> &'static [ImportRule] {
        self.spec.imports
    }
}
