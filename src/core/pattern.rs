//! SK-005: Pattern compilation.
//!
//! A syntax pattern is compiled once, at registration, into a flat token
//! program the matcher walks with two cursors. Meta-syntax:
//!
//! - `[a|b]` optional group, `(a|b)` required group; first alternative wins
//! - `N¦` at the start of an alternative sets a parse mark (XOR-ed when taken)
//! - `%type%`, `%types%`, `%-type%`, `%type1/type2%` typed placeholders
//! - `<regex>` raw capture, anchored to the whole span
//! - `\x` escapes the next character; any whitespace run is one space token

use super::registry::TypeTable;
use super::types::TypeId;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("unclosed '{0}'")]
    Unclosed(char),

    #[error("unexpected '{found}' at position {position}")]
    Unexpected { found: char, position: usize },

    #[error("'|' outside of a group at position {0}")]
    BarOutsideGroup(usize),

    #[error("unterminated placeholder (missing '%')")]
    UnterminatedPlaceholder,

    #[error("empty placeholder")]
    EmptyPlaceholder,

    #[error("unknown type '{0}' in placeholder")]
    UnknownType(String),

    #[error("unterminated regex (missing '>')")]
    UnterminatedRegex,

    #[error("invalid regex <{regex}>: {source}")]
    Regex {
        regex: String,
        #[source]
        source: regex::Error,
    },

    #[error("dangling '\\' at end of pattern")]
    DanglingEscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Optional,
    Required,
}

/// Start of one alternative inside a group, with its parse mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alternative {
    pub start: usize,
    pub mark: i32,
}

/// Types a placeholder accepts, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRequest {
    pub types: Vec<TypeId>,
    pub plural: bool,
}

impl TypeRequest {
    pub fn single(ty: TypeId) -> Self {
        Self {
            types: vec![ty],
            plural: false,
        }
    }

    pub fn plural(ty: TypeId) -> Self {
        Self {
            types: vec![ty],
            plural: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Token {
    Char(char),
    Space,
    Open {
        kind: GroupKind,
        alternatives: Vec<Alternative>,
        close: usize,
        ordinal: usize,
    },
    /// End of a non-final alternative; continues after the group's `Close`.
    Bar {
        close: usize,
    },
    Close,
    Placeholder {
        slot: usize,
        request: TypeRequest,
        optional: bool,
    },
    Regex {
        slot: usize,
        regex: Regex,
    },
}

#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
    placeholders: usize,
    regexes: usize,
    groups: usize,
}

struct OpenGroup {
    open: usize,
    kind: GroupKind,
    delimiter: char,
    bars: Vec<usize>,
    alternatives: Vec<Alternative>,
}

impl Pattern {
    /// Compile `source`, resolving placeholder type names against `types`.
    pub fn compile(source: &str, types: &TypeTable) -> Result<Self, PatternError> {
        let chars: Vec<char> = source.chars().collect();
        let mut tokens: Vec<Token> = Vec::new();
        let mut stack: Vec<OpenGroup> = Vec::new();
        let (mut placeholders, mut regexes, mut groups) = (0, 0, 0);
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '[' | '(' => {
                    let kind = if c == '[' {
                        GroupKind::Optional
                    } else {
                        GroupKind::Required
                    };
                    let open = tokens.len();
                    tokens.push(Token::Open {
                        kind,
                        alternatives: Vec::new(),
                        close: 0,
                        ordinal: groups,
                    });
                    groups += 1;
                    i += 1;
                    let (mark, next) = read_mark(&chars, i);
                    i = next;
                    stack.push(OpenGroup {
                        open,
                        kind,
                        delimiter: c,
                        bars: Vec::new(),
                        alternatives: vec![Alternative {
                            start: tokens.len(),
                            mark,
                        }],
                    });
                }
                '|' => {
                    let group = stack.last_mut().ok_or(PatternError::BarOutsideGroup(i))?;
                    group.bars.push(tokens.len());
                    tokens.push(Token::Bar { close: 0 });
                    i += 1;
                    let (mark, next) = read_mark(&chars, i);
                    i = next;
                    group.alternatives.push(Alternative {
                        start: tokens.len(),
                        mark,
                    });
                }
                ']' | ')' => {
                    let expected = if c == ']' {
                        GroupKind::Optional
                    } else {
                        GroupKind::Required
                    };
                    let group = match stack.pop() {
                        Some(g) if g.kind == expected => g,
                        _ => {
                            return Err(PatternError::Unexpected {
                                found: c,
                                position: i,
                            })
                        }
                    };
                    let close = tokens.len();
                    tokens.push(Token::Close);
                    for bar in &group.bars {
                        tokens[*bar] = Token::Bar { close };
                    }
                    if let Token::Open {
                        alternatives,
                        close: slot,
                        ..
                    } = &mut tokens[group.open]
                    {
                        *alternatives = group.alternatives;
                        *slot = close;
                    }
                    i += 1;
                }
                '%' => {
                    let end = find_from(&chars, i + 1, '%')
                        .ok_or(PatternError::UnterminatedPlaceholder)?;
                    let body: String = chars[i + 1..end].iter().collect();
                    let (optional, request) = parse_placeholder(&body, types)?;
                    tokens.push(Token::Placeholder {
                        slot: placeholders,
                        request,
                        optional,
                    });
                    placeholders += 1;
                    i = end + 1;
                }
                '<' => {
                    let end = find_from(&chars, i + 1, '>').ok_or(PatternError::UnterminatedRegex)?;
                    let body: String = chars[i + 1..end].iter().collect();
                    let regex = Regex::new(&format!("^(?:{})$", body))
                        .map_err(|source| PatternError::Regex { regex: body, source })?;
                    tokens.push(Token::Regex {
                        slot: regexes,
                        regex,
                    });
                    regexes += 1;
                    i = end + 1;
                }
                '\\' => {
                    let escaped = chars.get(i + 1).ok_or(PatternError::DanglingEscape)?;
                    tokens.push(Token::Char(*escaped));
                    i += 2;
                }
                c if c.is_whitespace() => {
                    if !matches!(tokens.last(), Some(Token::Space)) {
                        tokens.push(Token::Space);
                    }
                    i += 1;
                }
                c => {
                    tokens.push(Token::Char(c));
                    i += 1;
                }
            }
        }

        if let Some(group) = stack.pop() {
            return Err(PatternError::Unclosed(group.delimiter));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
            placeholders,
            regexes,
            groups,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders
    }

    pub fn regex_count(&self) -> usize {
        self.regexes
    }

    pub fn group_count(&self) -> usize {
        self.groups
    }

    /// Placeholder slots in pattern order: `(slot, request, optional)`.
    pub fn placeholders(&self) -> impl Iterator<Item = (usize, &TypeRequest, bool)> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Placeholder {
                slot,
                request,
                optional,
            } => Some((*slot, request, *optional)),
            _ => None,
        })
    }
}

fn find_from(chars: &[char], from: usize, needle: char) -> Option<usize> {
    chars[from.min(chars.len())..]
        .iter()
        .position(|c| *c == needle)
        .map(|p| p + from)
}

/// `-?\d+¦` at an alternative start; returns the mark and the next position.
fn read_mark(chars: &[char], start: usize) -> (i32, usize) {
    let mut j = start;
    if chars.get(j) == Some(&'-') {
        j += 1;
    }
    let digits = j;
    while chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
        j += 1;
    }
    if j == digits || chars.get(j) != Some(&'¦') {
        return (0, start);
    }
    let text: String = chars[start..j].iter().collect();
    match text.parse::<i32>() {
        Ok(mark) => (mark, j + 1),
        Err(_) => (0, start),
    }
}

fn parse_placeholder(body: &str, types: &TypeTable) -> Result<(bool, TypeRequest), PatternError> {
    let (optional, names) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    if names.trim().is_empty() {
        return Err(PatternError::EmptyPlaceholder);
    }
    let mut request = TypeRequest {
        types: Vec::new(),
        plural: false,
    };
    for name in names.split('/') {
        let name = name.trim();
        let (ty, plural) = types
            .lookup(name)
            .ok_or_else(|| PatternError::UnknownType(name.to_string()))?;
        request.types.push(ty);
        request.plural |= plural;
    }
    Ok((optional, request))
}
